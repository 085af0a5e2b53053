// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/output/draw.rs - 识别结果绘制与记录
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use serde::Serialize;

use crate::{
  candidate::CandidateStatus,
  extract::Detection,
  geometry::{AsBoxRect, BoxRect},
  pipeline::DetectionOutput,
  preprocess::ContrastDecision,
};

const ACCEPTED_COLOR: [u8; 3] = [0, 200, 0]; // 绿色
const REJECTED_COLOR: [u8; 3] = [220, 0, 0]; // 红色
const DETECTION_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const LINE_THICKNESS: u32 = 2;

/// 在原图上绘制候选区域与识别结果
#[derive(Debug, Clone)]
pub struct DrawOverlay {
  pub accepted_color: [u8; 3],
  pub rejected_color: [u8; 3],
  pub detection_color: [u8; 3],
  pub thickness: u32,
  /// 是否绘制被拒绝的候选
  pub show_rejected: bool,
}

impl Default for DrawOverlay {
  fn default() -> Self {
    Self {
      accepted_color: ACCEPTED_COLOR,
      rejected_color: REJECTED_COLOR,
      detection_color: DETECTION_COLOR,
      thickness: LINE_THICKNESS,
      show_rejected: true,
    }
  }
}

impl DrawOverlay {
  // 在图像上绘制矩形边框，bbox 为原图像素坐标
  fn draw_box(&self, image: &mut RgbImage, bbox: &BoxRect, color: [u8; 3]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let x_min = (bbox.x.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.y.floor() as i32).clamp(0, h - 1);
    let x_max = (bbox.right().ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox.bottom().ceil() as i32).clamp(0, h - 1);

    for t in 0..self.thickness as i32 {
      let (width, height) = (x_max - x_min - 2 * t, y_max - y_min - 2 * t);
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }
  }

  /// 候选区域坐标位于归一化图像中，乘以缩放系数后绘制
  pub fn draw_on_image(&self, image: &mut RgbImage, output: &DetectionOutput) {
    for candidate in &output.candidates {
      let color = match candidate.status {
        CandidateStatus::Accepted => self.accepted_color,
        CandidateStatus::Rejected(_) if self.show_rejected => self.rejected_color,
        CandidateStatus::Rejected(_) => continue,
      };
      let bbox = candidate.box_rect().scale(output.scale_factor);
      self.draw_box(image, &bbox, color);
    }

    for detection in &output.detections {
      self.draw_box(image, &detection.box_rect(), self.detection_color);
    }
  }

  pub fn draw(&self, image: &DynamicImage, output: &DetectionOutput) -> RgbImage {
    let mut canvas = image.to_rgb8();
    self.draw_on_image(&mut canvas, output);
    canvas
  }
}

#[derive(Debug, Clone, Serialize)]
struct CandidateRecord {
  /// 原图像素坐标
  bbox: BoxRect,
  #[serde(flatten)]
  status: CandidateStatus,
  aspect_ratio: f32,
  relative_area: f32,
  median_brightness: u8,
  mean_brightness: f32,
}

/// 单张照片识别结果的 JSON 记录
#[derive(Debug, Clone, Serialize)]
pub struct DetectionRecord<'a> {
  pub photo: &'a str,
  pub original_size: (u32, u32),
  pub normalized_size: (u32, u32),
  pub scale_factor: f32,
  pub contrast: ContrastDecision,
  pub detections: &'a [Detection],
  #[serde(skip_serializing_if = "Vec::is_empty")]
  candidates: Vec<CandidateRecord>,
}

/// 识别结果记录器
#[derive(Debug, Clone, Default)]
pub struct Record {
  /// 是否同时记录候选区域
  pub with_candidates: bool,
}

impl Record {
  pub fn to_record<'a>(&self, photo: &'a str, output: &'a DetectionOutput) -> DetectionRecord<'a> {
    let candidates = if self.with_candidates {
      output
        .candidates
        .iter()
        .map(|c| CandidateRecord {
          bbox: c.box_rect().scale(output.scale_factor),
          status: c.status,
          aspect_ratio: c.aspect_ratio,
          relative_area: c.relative_area,
          median_brightness: c.median_brightness,
          mean_brightness: c.mean_brightness,
        })
        .collect()
    } else {
      Vec::new()
    };

    DetectionRecord {
      photo,
      original_size: output.original_size,
      normalized_size: output.normalized_size,
      scale_factor: output.scale_factor,
      contrast: output.contrast,
      detections: &output.detections,
      candidates,
    }
  }

  /// 把记录写入 `path`，文件名由调用方决定
  pub fn record(
    &self,
    photo: &str,
    output: &DetectionOutput,
    path: &Path,
  ) -> Result<(), std::io::Error> {
    let record = self.to_record(photo, output);
    let json = serde_json::to_string_pretty(&record).map_err(std::io::Error::other)?;
    std::fs::write(path, json)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    candidate::{Candidate, RejectionReason},
    extract::DetectionSource,
    geometry::Quad,
  };

  fn output() -> DetectionOutput {
    let candidate = |x, status| Candidate {
      rect: Rect::at(x, 10).of_size(20, 10),
      area: 200.0,
      aspect_ratio: 2.0,
      median_brightness: 220,
      mean_brightness: 210.0,
      relative_area: 0.01,
      status,
    };
    DetectionOutput {
      detections: vec![Detection {
        bib_number: "42".to_string(),
        confidence: 0.8,
        bbox: Quad::from_rect(&BoxRect::new(24.0, 24.0, 30.0, 16.0)),
        source: DetectionSource::Region,
        source_candidate: Some(0),
      }],
      candidates: vec![
        candidate(10, CandidateStatus::Accepted),
        candidate(40, CandidateStatus::Rejected(RejectionReason::Brightness)),
      ],
      contrast: ContrastDecision::Disabled,
      scale_factor: 2.0,
      original_size: (200, 100),
      normalized_size: (100, 50),
    }
  }

  #[test]
  fn overlay_scales_candidates_back_to_original() {
    let image = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
    let canvas = DrawOverlay::default().draw(&image, &output());
    // 通过的候选 (10,10,20,10) 放大两倍后左上角位于 (20,20)
    assert_eq!(canvas.get_pixel(20, 20), &Rgb(ACCEPTED_COLOR));
    assert_eq!(canvas.get_pixel(80, 20), &Rgb(REJECTED_COLOR));
    assert_eq!(canvas.get_pixel(24, 30), &Rgb(DETECTION_COLOR));
    assert_eq!(canvas.get_pixel(150, 80), &Rgb([0, 0, 0]));
  }

  #[test]
  fn rejected_candidates_can_be_hidden() {
    let image = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
    let overlay = DrawOverlay {
      show_rejected: false,
      ..Default::default()
    };
    let canvas = overlay.draw(&image, &output());
    assert_eq!(canvas.get_pixel(80, 20), &Rgb([0, 0, 0]));
  }

  #[test]
  fn record_serializes_detections() {
    let output = output();
    let record = Record {
      with_candidates: true,
    }
    .to_record("IMG_0001", &output);
    let json: serde_json::Value = serde_json::to_value(&record).unwrap();
    assert_eq!(json["photo"], "IMG_0001");
    assert_eq!(json["detections"][0]["bib_number"], "42");
    assert_eq!(json["detections"][0]["source"], "region");
    assert_eq!(json["candidates"][1]["status"], "rejected");
    assert_eq!(json["candidates"][1]["reason"], "brightness");
    assert_eq!(json["contrast"]["decision"], "disabled");
  }
}
