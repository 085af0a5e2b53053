// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/resolve.rs - 重叠结果消解与去重
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

use std::collections::HashMap;

use tracing::debug;

use crate::{
  config::ResolveConfig,
  error::BibResult,
  extract::Detection,
  geometry::AsBoxRect,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keep {
  First,
  Second,
}

/// 重叠消解器
#[derive(Debug, Clone)]
pub struct OverlapResolver {
  config: ResolveConfig,
}

impl OverlapResolver {
  pub fn new(config: ResolveConfig) -> BibResult<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  /// IoU 达到阈值，或交集覆盖较小框的比例达到阈值
  pub fn overlaps(&self, a: &Detection, b: &Detection) -> bool {
    let (ra, rb) = (a.box_rect(), b.box_rect());
    ra.iou(&rb) >= self.config.iou_threshold
      || ra.coverage_of_smaller(&rb) >= self.config.coverage_threshold
  }

  fn choose(&self, a: &Detection, b: &Detection) -> Keep {
    let (na, nb) = (&a.bib_number, &b.bib_number);

    if na != nb && (na.contains(nb.as_str()) || nb.contains(na.as_str())) {
      // 子串关系，如 "6" 与 "620"
      let (longer, shorter, keep_longer, keep_shorter) = if na.len() > nb.len() {
        (a, b, Keep::First, Keep::Second)
      } else {
        (b, a, Keep::Second, Keep::First)
      };
      return if shorter.confidence > longer.confidence * self.config.substring_confidence_ratio {
        keep_shorter
      } else {
        keep_longer
      };
    }

    if na.len() != nb.len() {
      return if na.len() > nb.len() {
        Keep::First
      } else {
        Keep::Second
      };
    }

    if b.confidence > a.confidence {
      Keep::Second
    } else {
      Keep::First
    }
  }

  /// 消解重叠、按号码去重，并把坐标乘以 `scale_factor` 映射回原图
  pub fn resolve(&self, detections: Vec<Detection>, scale_factor: f32) -> Vec<Detection> {
    let total = detections.len();
    let mut alive = vec![true; total];

    for i in 0..total {
      if !alive[i] {
        continue;
      }
      for j in (i + 1)..total {
        if !alive[j] || !self.overlaps(&detections[i], &detections[j]) {
          continue;
        }
        let loser = match self.choose(&detections[i], &detections[j]) {
          Keep::First => j,
          Keep::Second => i,
        };
        debug!(
          "重叠消解: 保留 {}, 丢弃 {}",
          detections[i + j - loser].bib_number,
          detections[loser].bib_number
        );
        alive[loser] = false;
        if loser == i {
          break;
        }
      }
    }

    // 每个号码只保留置信度最高的一条
    let mut best: HashMap<&str, usize> = HashMap::new();
    for (index, detection) in detections.iter().enumerate() {
      if !alive[index] {
        continue;
      }
      best
        .entry(detection.bib_number.as_str())
        .and_modify(|kept| {
          if detection.confidence > detections[*kept].confidence {
            *kept = index;
          }
        })
        .or_insert(index);
    }
    let mut keep = vec![false; total];
    for &index in best.values() {
      keep[index] = true;
    }

    let resolved: Vec<Detection> = detections
      .into_iter()
      .zip(keep)
      .filter_map(|(detection, keep)| keep.then_some(detection))
      .map(|mut detection| {
        detection.bbox = detection.bbox.scale(scale_factor);
        detection
      })
      .collect();
    debug!("重叠消解: {} -> {}", total, resolved.len());
    resolved
  }
}
