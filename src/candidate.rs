// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/candidate.rs - 亮色矩形候选区域检测
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

use image::{GrayImage, imageops};
use imageproc::{
  contours::{BorderType, Contour, find_contours},
  contrast::{ThresholdType, threshold},
  point::Point,
  rect::Rect,
};
use serde::Serialize;
use tracing::debug;

use crate::{
  config::CandidateConfig,
  error::BibResult,
  geometry::{AsBoxRect, BoxRect},
  preprocess::NormalizedImage,
};

/// 候选区域被拒绝的原因，按检查优先级排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
  AspectRatio,
  RelativeArea,
  Brightness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CandidateStatus {
  Accepted,
  Rejected(RejectionReason),
}

/// 候选区域，坐标为归一化图像像素坐标
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  /// 外接矩形；通过的候选已按配置向外扩展
  pub rect: Rect,
  /// 扩展前的外接矩形面积
  pub area: f32,
  pub aspect_ratio: f32,
  pub median_brightness: u8,
  pub mean_brightness: f32,
  pub relative_area: f32,
  pub status: CandidateStatus,
}

impl Candidate {
  pub fn passed(&self) -> bool {
    self.status == CandidateStatus::Accepted
  }

  pub fn rejection_reason(&self) -> Option<RejectionReason> {
    match self.status {
      CandidateStatus::Accepted => None,
      CandidateStatus::Rejected(reason) => Some(reason),
    }
  }
}

impl AsBoxRect for Candidate {
  fn box_rect(&self) -> BoxRect {
    self.rect.into()
  }
}

/// 区域内像素的中位亮度与平均亮度，区域为空时返回 (0, 0.0)
pub fn region_brightness(image: &GrayImage, rect: &Rect) -> (u8, f32) {
  let Some(rect) = clamp_rect(rect, image.width(), image.height()) else {
    return (0, 0.0);
  };

  let mut hist = [0u32; 256];
  let mut sum = 0u64;
  for y in rect.top()..=rect.bottom() {
    for x in rect.left()..=rect.right() {
      let v = image.get_pixel(x as u32, y as u32)[0];
      hist[v as usize] += 1;
      sum += v as u64;
    }
  }
  let count = rect.width() as u64 * rect.height() as u64;
  let half = count.div_ceil(2);
  let mut cumulative = 0u64;
  let mut median = 0u8;
  for (v, &n) in hist.iter().enumerate() {
    cumulative += n as u64;
    if cumulative >= half {
      median = v as u8;
      break;
    }
  }
  (median, sum as f32 / count as f32)
}

/// 将矩形裁剪到图像范围内，完全在外时返回 `None`
pub fn clamp_rect(rect: &Rect, width: u32, height: u32) -> Option<Rect> {
  let left = rect.left().max(0);
  let top = rect.top().max(0);
  let right = rect.right().min(width as i32 - 1);
  let bottom = rect.bottom().min(height as i32 - 1);
  if left > right || top > bottom {
    return None;
  }
  Some(Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32))
}

/// 亮色矩形候选区域检测器
#[derive(Debug, Clone)]
pub struct CandidateDetector {
  config: CandidateConfig,
}

impl CandidateDetector {
  pub fn new(config: CandidateConfig) -> BibResult<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  /// 查找候选区域；`include_rejected` 为真时同时返回被拒绝的候选
  pub fn find_candidates(&self, image: &NormalizedImage, include_rejected: bool) -> Vec<Candidate> {
    let all = self.evaluate_regions(image.image());
    let accepted = all.iter().filter(|c| c.passed()).count();
    debug!(
      "候选区域: 共 {} 个, 通过 {} 个, 拒绝 {} 个",
      all.len(),
      accepted,
      all.len() - accepted
    );
    if include_rejected {
      all
    } else {
      all.into_iter().filter(Candidate::passed).collect()
    }
  }

  fn evaluate_regions(&self, gray: &GrayImage) -> Vec<Candidate> {
    let binary = threshold(gray, self.config.brightness_cutoff, ThresholdType::Binary);
    let image_area = gray.width() as f32 * gray.height() as f32;

    external_contours(&binary)
      .iter()
      .filter(|c| contour_area(&c.points) >= self.config.min_contour_area)
      .filter_map(|c| bounding_rect(&c.points))
      .map(|rect| self.classify(gray, rect, image_area))
      .collect()
  }

  fn classify(&self, gray: &GrayImage, rect: Rect, image_area: f32) -> Candidate {
    let (w, h) = (rect.width() as f32, rect.height() as f32);
    let area = w * h;
    let aspect_ratio = w / h;
    let relative_area = area / image_area;
    let (median_brightness, mean_brightness) = region_brightness(gray, &rect);

    let config = &self.config;
    let status = if !(config.min_aspect..=config.max_aspect).contains(&aspect_ratio) {
      CandidateStatus::Rejected(RejectionReason::AspectRatio)
    } else if !(config.min_relative_area..=config.max_relative_area).contains(&relative_area) {
      CandidateStatus::Rejected(RejectionReason::RelativeArea)
    } else if median_brightness < config.min_median_brightness
      || mean_brightness < config.min_mean_brightness
    {
      CandidateStatus::Rejected(RejectionReason::Brightness)
    } else {
      CandidateStatus::Accepted
    };

    let rect = match status {
      CandidateStatus::Accepted => self.pad(&rect, gray.width(), gray.height()),
      CandidateStatus::Rejected(_) => rect,
    };

    Candidate {
      rect,
      area,
      aspect_ratio,
      median_brightness,
      mean_brightness,
      relative_area,
      status,
    }
  }

  fn pad(&self, rect: &Rect, width: u32, height: u32) -> Rect {
    let side = rect.width().min(rect.height()) as f32;
    let pad = (self.config.padding_fraction * side).round() as i32;
    let left = (rect.left() - pad).max(0);
    let top = (rect.top() - pad).max(0);
    let right = (rect.right() + pad).min(width as i32 - 1);
    let bottom = (rect.bottom() + pad).min(height as i32 - 1);
    Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32)
  }
}

/// 最外层轮廓
///
/// 贴着图像边缘的区域会被 `find_contours` 当作孔洞，因此先在四周补一圈背景，
/// 再把坐标平移回原图。
fn external_contours(binary: &GrayImage) -> Vec<Contour<i32>> {
  let mut framed = GrayImage::new(binary.width() + 2, binary.height() + 2);
  imageops::replace(&mut framed, binary, 1, 1);
  find_contours::<i32>(&framed)
    .into_iter()
    .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
    .map(|mut c| {
      for p in c.points.iter_mut() {
        p.x -= 1;
        p.y -= 1;
      }
      c
    })
    .collect()
}

/// 轮廓多边形面积（鞋带公式）
fn contour_area(points: &[Point<i32>]) -> f32 {
  if points.len() < 3 {
    return 0.0;
  }
  let mut twice = 0i64;
  for (i, p) in points.iter().enumerate() {
    let q = &points[(i + 1) % points.len()];
    twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
  }
  (twice.abs() as f32) / 2.0
}

fn bounding_rect(points: &[Point<i32>]) -> Option<Rect> {
  let x_min = points.iter().map(|p| p.x).min()?;
  let x_max = points.iter().map(|p| p.x).max()?;
  let y_min = points.iter().map(|p| p.y).min()?;
  let y_max = points.iter().map(|p| p.y).max()?;
  Some(Rect::at(x_min, y_min).of_size((x_max - x_min + 1) as u32, (y_max - y_min + 1) as u32))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{config::PreprocessConfig, preprocess::Preprocessor};
  use image::{DynamicImage, Luma};

  fn canvas(width: u32, height: u32, value: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([value]))
  }

  fn fill(image: &mut GrayImage, x: u32, y: u32, w: u32, h: u32, value: u8) {
    for yy in y..y + h {
      for xx in x..x + w {
        image.put_pixel(xx, yy, Luma([value]));
      }
    }
  }

  /// 只有边框是亮色，内部为暗色
  fn frame(image: &mut GrayImage, x: u32, y: u32, w: u32, h: u32, border: u32) {
    fill(image, x, y, w, h, 230);
    fill(image, x + border, y + border, w - 2 * border, h - 2 * border, 20);
  }

  fn normalized(image: GrayImage) -> NormalizedImage {
    let pre = Preprocessor::new(PreprocessConfig {
      target_width: None,
      contrast_enabled: false,
      ..Default::default()
    })
    .unwrap();
    pre.normalize(&DynamicImage::ImageLuma8(image)).unwrap()
  }

  fn detector() -> CandidateDetector {
    CandidateDetector::new(CandidateConfig::default()).unwrap()
  }

  #[test]
  fn bright_rectangle_is_accepted_and_padded() {
    let mut image = canvas(640, 480, 30);
    fill(&mut image, 200, 150, 120, 80, 235);
    let candidates = detector().find_candidates(&normalized(image), false);

    assert_eq!(candidates.len(), 1);
    let c = &candidates[0];
    assert!(c.passed());
    assert_eq!(c.rejection_reason(), None);
    assert_eq!(c.area, 120.0 * 80.0);
    assert!((c.aspect_ratio - 1.5).abs() < 1e-6);
    assert_eq!(c.median_brightness, 235);
    // 扩展 0.15 * min(120, 80) = 12 像素
    assert_eq!(c.rect, Rect::at(188, 138).of_size(144, 104));
  }

  #[test]
  fn padding_is_clamped_to_image_bounds() {
    let mut image = canvas(400, 300, 30);
    fill(&mut image, 0, 0, 100, 60, 240);
    let candidates = detector().find_candidates(&normalized(image), false);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].rect.left(), 0);
    assert_eq!(candidates[0].rect.top(), 0);
    assert_eq!(candidates[0].rect.width(), 109);
  }

  #[test]
  fn region_on_the_left_edge_is_found() {
    let mut image = canvas(400, 300, 30);
    fill(&mut image, 0, 100, 100, 60, 240);
    let candidates = detector().find_candidates(&normalized(image), false);
    assert_eq!(candidates.len(), 1);
    // 扩展 0.15 * 60 = 9 像素，左侧被截断
    assert_eq!(candidates[0].rect, Rect::at(0, 91).of_size(109, 78));
  }

  #[test]
  fn regions_on_every_edge_are_found() {
    let mut image = canvas(400, 300, 30);
    fill(&mut image, 150, 0, 100, 60, 240);
    fill(&mut image, 300, 120, 100, 60, 240);
    fill(&mut image, 150, 240, 100, 60, 240);
    let candidates = detector().find_candidates(&normalized(image), false);
    assert_eq!(candidates.len(), 3);
    assert!(candidates.iter().all(|c| c.area == 100.0 * 60.0));
  }

  #[test]
  fn aspect_ratio_reason_wins_over_brightness() {
    let mut image = canvas(640, 480, 30);
    // 宽高比 7.5 且内部暗，两项检查都不通过
    frame(&mut image, 50, 50, 300, 40, 2);
    let candidates = detector().find_candidates(&normalized(image), true);

    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].mean_brightness < 120.0);
    assert_eq!(
      candidates[0].status,
      CandidateStatus::Rejected(RejectionReason::AspectRatio)
    );
  }

  #[test]
  fn dark_interior_is_rejected_for_brightness() {
    let mut image = canvas(640, 480, 30);
    frame(&mut image, 100, 100, 200, 100, 3);
    let candidates = detector().find_candidates(&normalized(image), true);
    assert_eq!(candidates.len(), 1);
    assert_eq!(
      candidates[0].rejection_reason(),
      Some(RejectionReason::Brightness)
    );
  }

  #[test]
  fn oversized_region_is_rejected_for_relative_area() {
    let mut image = canvas(400, 300, 30);
    fill(&mut image, 20, 20, 300, 200, 240);
    let candidates = detector().find_candidates(&normalized(image), true);
    assert_eq!(candidates.len(), 1);
    assert_eq!(
      candidates[0].rejection_reason(),
      Some(RejectionReason::RelativeArea)
    );
  }

  #[test]
  fn rejected_candidates_are_hidden_by_default() {
    let mut image = canvas(640, 480, 30);
    frame(&mut image, 50, 50, 300, 40, 2);
    fill(&mut image, 400, 300, 90, 60, 240);
    let normalized = normalized(image);

    let passed = detector().find_candidates(&normalized, false);
    let all = detector().find_candidates(&normalized, true);
    assert_eq!(passed.len(), 1);
    assert_eq!(all.len(), 2);
    // 拒绝的候选不扩展
    let rejected = all.iter().find(|c| !c.passed()).unwrap();
    assert_eq!(rejected.rect, Rect::at(50, 50).of_size(300, 40));
  }

  #[test]
  fn tiny_blobs_are_ignored() {
    let mut image = canvas(640, 480, 30);
    fill(&mut image, 10, 10, 5, 5, 250);
    assert!(detector().find_candidates(&normalized(image), true).is_empty());
  }

  #[test]
  fn region_brightness_reports_median_and_mean() {
    let mut image = canvas(10, 10, 0);
    fill(&mut image, 0, 0, 10, 6, 200);
    let (median, mean) = region_brightness(&image, &Rect::at(0, 0).of_size(10, 10));
    assert_eq!(median, 200);
    assert!((mean - 120.0).abs() < 1e-4);
  }
}
