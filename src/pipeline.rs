// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/pipeline.rs - 单张照片号码识别流水线
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

use image::DynamicImage;
use tracing::{debug, info};

use crate::{
  candidate::{Candidate, CandidateDetector},
  config::PipelineConfig,
  error::BibResult,
  extract::{Detection, Extractor},
  preprocess::{ContrastDecision, Preprocessor},
  resolve::OverlapResolver,
  text_service::TextService,
};

/// 单张照片的识别结果及诊断信息
#[derive(Debug, Clone)]
pub struct DetectionOutput {
  /// 原图坐标下的最终结果，号码互不相同
  pub detections: Vec<Detection>,
  /// 全部候选区域（含被拒绝的），坐标位于归一化图像
  pub candidates: Vec<Candidate>,
  pub contrast: ContrastDecision,
  pub scale_factor: f32,
  pub original_size: (u32, u32),
  pub normalized_size: (u32, u32),
}

/// 号码识别器
///
/// 不持有可变状态，可在多个线程中各自持有一份并行处理不同照片。
#[derive(Debug, Clone)]
pub struct BibDetector {
  preprocessor: Preprocessor,
  candidates: CandidateDetector,
  extractor: Extractor,
  resolver: OverlapResolver,
}

impl BibDetector {
  pub fn new(config: PipelineConfig) -> BibResult<Self> {
    config.validate()?;
    let PipelineConfig {
      preprocess,
      candidate,
      extract,
      bib_range,
      resolve,
    } = config;
    Ok(Self {
      preprocessor: Preprocessor::new(preprocess)?,
      candidates: CandidateDetector::new(candidate)?,
      extractor: Extractor::new(extract, bib_range)?,
      resolver: OverlapResolver::new(resolve)?,
    })
  }

  pub fn detect<S: TextService>(
    &self,
    image: &DynamicImage,
    service: &S,
  ) -> BibResult<DetectionOutput> {
    let now = std::time::Instant::now();
    let normalized = self.preprocessor.normalize(image)?;
    debug!(
      "归一化完成: {}x{}, 缩放系数 {:.3}",
      normalized.width(),
      normalized.height(),
      normalized.scale_factor()
    );

    let candidates = self.candidates.find_candidates(&normalized, true);
    let raw = self.extractor.extract(&normalized, &candidates, service)?;
    let detections = self.resolver.resolve(raw, normalized.scale_factor());

    info!(
      "识别完成: {} 个候选, {} 个号码, 耗时 {:.2?}",
      candidates.iter().filter(|c| c.passed()).count(),
      detections.len(),
      now.elapsed()
    );

    Ok(DetectionOutput {
      detections,
      candidates,
      contrast: normalized.contrast(),
      scale_factor: normalized.scale_factor(),
      original_size: (normalized.original_width(), normalized.original_height()),
      normalized_size: (normalized.width(), normalized.height()),
    })
  }
}
