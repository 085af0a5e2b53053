// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/extract.rs - 号码文字提取与校验
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

use std::collections::HashSet;

use image::imageops;
use imageproc::rect::Rect;
use serde::Serialize;
use tracing::debug;

use crate::{
  candidate::{Candidate, clamp_rect, region_brightness},
  config::{BibRangeConfig, ExtractConfig},
  error::{BibError, BibResult},
  geometry::{AsBoxRect, BoxRect, Quad},
  preprocess::NormalizedImage,
  text_service::{RawTextHit, TextService},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
  Region,
  FullImage,
}

/// 一条号码识别结果
///
/// 提取阶段坐标位于归一化图像中，经重叠消解后映射回原图坐标。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub bib_number: String,
  pub confidence: f32,
  pub bbox: Quad,
  pub source: DetectionSource,
  /// 来源候选区域在候选列表中的下标
  pub source_candidate: Option<usize>,
}

impl AsBoxRect for Detection {
  fn box_rect(&self) -> BoxRect {
    self.bbox.bounding_rect()
  }
}

/// 去掉首尾及内部空白
pub fn clean_text(text: &str) -> String {
  text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// 置信度必须严格高于门槛且不超过 1；NaN 不通过
fn confidence_passes(confidence: f32, bar: f32) -> bool {
  bar < confidence && confidence <= 1.0
}

/// 号码校验器
#[derive(Debug, Clone)]
pub struct BibValidator {
  range: BibRangeConfig,
  max_digits: usize,
}

impl BibValidator {
  pub fn new(range: BibRangeConfig) -> BibResult<Self> {
    range.validate()?;
    let max_digits = range.max_digits();
    Ok(Self { range, max_digits })
  }

  /// 清洗并校验文本，合法时返回号码字符串
  pub fn validate(&self, text: &str) -> Option<String> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() || cleaned.len() > self.max_digits {
      return None;
    }
    if !cleaned.bytes().all(|b| b.is_ascii_digit()) || cleaned.starts_with('0') {
      return None;
    }
    let value: u32 = cleaned.parse().ok()?;
    (self.range.min_bib..=self.range.max_bib)
      .contains(&value)
      .then_some(cleaned)
  }
}

/// 文字提取器：候选区域逐个识别，随后对全图识别一次
#[derive(Debug, Clone)]
pub struct Extractor {
  config: ExtractConfig,
  validator: BibValidator,
}

impl Extractor {
  pub fn new(config: ExtractConfig, range: BibRangeConfig) -> BibResult<Self> {
    config.validate()?;
    let validator = BibValidator::new(range)?;
    Ok(Self { config, validator })
  }

  pub fn validator(&self) -> &BibValidator {
    &self.validator
  }

  pub fn extract<S: TextService>(
    &self,
    image: &NormalizedImage,
    candidates: &[Candidate],
    service: &S,
  ) -> BibResult<Vec<Detection>> {
    let mut detections = self.extract_regions(image, candidates, service)?;
    let seen: HashSet<String> = detections.iter().map(|d| d.bib_number.clone()).collect();
    let full = self.extract_full_image(image, service, &seen)?;
    debug!(
      "提取完成: 区域 {} 条, 全图 {} 条",
      detections.len(),
      full.len()
    );
    detections.extend(full);
    Ok(detections)
  }

  /// 识别每个通过的候选区域，结果坐标平移回归一化图像
  pub fn extract_regions<S: TextService>(
    &self,
    image: &NormalizedImage,
    candidates: &[Candidate],
    service: &S,
  ) -> BibResult<Vec<Detection>> {
    let gray = image.image();
    let mut detections = Vec::new();

    for (index, candidate) in candidates.iter().enumerate() {
      if !candidate.passed() {
        continue;
      }
      let Some(rect) = clamp_rect(&candidate.rect, gray.width(), gray.height()) else {
        continue;
      };
      let (left, top) = (rect.left() as u32, rect.top() as u32);
      let crop = imageops::crop_imm(gray, left, top, rect.width(), rect.height()).to_image();
      let hits = service.read_text(&crop).map_err(BibError::text_service)?;

      let min_area = self.config.min_hit_area_fraction * candidate.area;
      for hit in hits {
        let Some(bib_number) = self.validator.validate(&hit.text) else {
          debug!("区域 {}: 丢弃非号码文本 {:?}", index, hit.text);
          continue;
        };
        if !confidence_passes(hit.confidence, self.config.region_min_confidence) {
          debug!(
            "区域 {}: 丢弃低置信度号码 {} ({:.2})",
            index, bib_number, hit.confidence
          );
          continue;
        }
        let bbox = hit.bbox.offset(left as f32, top as f32);
        if bbox.bounding_rect().area() < min_area {
          debug!("区域 {}: 丢弃过小的号码框 {}", index, bib_number);
          continue;
        }
        detections.push(Detection {
          bib_number,
          confidence: hit.confidence,
          bbox,
          source: DetectionSource::Region,
          source_candidate: Some(index),
        });
      }
    }

    Ok(detections)
  }

  /// 全图识别；已由区域识别得到的号码直接跳过
  pub fn extract_full_image<S: TextService>(
    &self,
    image: &NormalizedImage,
    service: &S,
    seen: &HashSet<String>,
  ) -> BibResult<Vec<Detection>> {
    let hits = service
      .read_text(image.image())
      .map_err(BibError::text_service)?;

    Ok(
      hits
        .into_iter()
        .filter_map(|hit| self.accept_full_image_hit(image, hit, seen))
        .collect(),
    )
  }

  fn accept_full_image_hit(
    &self,
    image: &NormalizedImage,
    hit: RawTextHit,
    seen: &HashSet<String>,
  ) -> Option<Detection> {
    let bib_number = self.validator.validate(&hit.text)?;
    if !confidence_passes(hit.confidence, self.config.full_image_min_confidence) {
      debug!("全图: 丢弃低置信度号码 {} ({:.2})", bib_number, hit.confidence);
      return None;
    }
    if seen.contains(&bib_number) {
      debug!("全图: 号码 {} 已由区域识别得到", bib_number);
      return None;
    }

    // 暗底亮字（如标志）不是号码布
    let rect = hit.bbox.bounding_rect();
    let pixel_rect = Rect::at(rect.x.floor() as i32, rect.y.floor() as i32).of_size(
      (rect.w.ceil() as u32).max(1),
      (rect.h.ceil() as u32).max(1),
    );
    let (median, mean) = region_brightness(image.image(), &pixel_rect);
    if median < self.config.full_image_min_median_brightness
      || mean < self.config.full_image_min_mean_brightness
    {
      debug!(
        "全图: 号码 {} 所在区域过暗 (中位 {}, 平均 {:.1})",
        bib_number, median, mean
      );
      return None;
    }

    Some(Detection {
      bib_number,
      confidence: hit.confidence,
      bbox: hit.bbox,
      source: DetectionSource::FullImage,
      source_candidate: None,
    })
  }
}
