// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/task.rs - 批量识别与评测任务
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

use std::path::PathBuf;

use anyhow::Context;
use image::DynamicImage;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
  config::EvaluationConfig,
  evaluate::{
    LinkMatchResult, LinkScorecard, LinkScorecardReport, MatchResult, Scorecard, ScorecardReport,
    match_boxes, score_bib_numbers, score_links,
  },
  geometry::{AsBoxRect, BoxRect},
  ground_truth::{GroundTruthSet, PhotoLabels},
  input::Photo,
  link::predict_links,
  output::Render,
  pipeline::BibDetector,
  text_service::TextService,
};

pub trait Task<I, S, O>: Sized {
  type Error;
  fn run_task(self, input: I, service: S, output: O) -> Result<(), Self::Error>;
}

/// 逐张识别照片并交给输出
///
/// 单张照片失败只记录警告，不影响其余照片。
pub struct DetectTask {
  detector: BibDetector,
}

impl DetectTask {
  pub fn new(detector: BibDetector) -> Self {
    Self { detector }
  }
}

impl<E, I, S, O> Task<I, S, O> for DetectTask
where
  E: std::error::Error + Send + Sync + 'static,
  I: Iterator<Item = Result<Photo, E>>,
  S: TextService,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, service: S, output: O) -> Result<(), Self::Error> {
    info!("开始识别任务...");
    let (mut done, mut failed, mut found) = (0usize, 0usize, 0usize);
    let now = std::time::Instant::now();

    for photo in input {
      let result = photo.map_err(anyhow::Error::from).and_then(|photo| {
        let result = self
          .detector
          .detect(&photo.image, &service)
          .with_context(|| format!("识别照片 {} 失败", photo.id))?;
        for detection in &result.detections {
          info!(
            "{}: 号码 {} (置信度 {:.2}, 来源 {:?})",
            photo.id, detection.bib_number, detection.confidence, detection.source
          );
        }
        output.render_result(&photo, &result)?;
        Ok(result.detections.len())
      });

      match result {
        Ok(count) => {
          done += 1;
          found += count;
        }
        Err(err) => {
          failed += 1;
          warn!("跳过照片: {:#}", err);
        }
      }
    }

    info!(
      "识别任务完成: 成功 {} 张, 失败 {} 张, 共 {} 个号码, 耗时 {:.2?}",
      done,
      failed,
      found,
      now.elapsed()
    );
    if done == 0 && failed > 0 {
      anyhow::bail!("全部 {} 张照片处理失败", failed);
    }
    Ok(())
  }
}

/// 单张照片的评测明细
#[derive(Debug, Clone, Serialize)]
pub struct PhotoReport {
  pub photo: String,
  pub detected: Vec<String>,
  pub expected: Vec<String>,
  pub bib_boxes: MatchResult,
  pub bib_numbers: MatchResult,
  pub links: LinkMatchResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedPhoto {
  pub photo: String,
  pub error: String,
}

/// 一次评测的汇总报告
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
  pub generated_at: String,
  pub iou_threshold: f32,
  pub photo_count: usize,
  pub evaluated_count: usize,
  pub bib_boxes: ScorecardReport,
  pub bib_numbers: ScorecardReport,
  pub links: LinkScorecardReport,
  pub failed_photos: Vec<FailedPhoto>,
  pub photos: Vec<PhotoReport>,
}

/// 对照人工标注评测识别质量
pub struct BenchmarkTask {
  detector: BibDetector,
  evaluation: EvaluationConfig,
  images: PathBuf,
}

impl BenchmarkTask {
  pub fn new(
    detector: BibDetector,
    evaluation: EvaluationConfig,
    images: impl Into<PathBuf>,
  ) -> anyhow::Result<Self> {
    evaluation.validate()?;
    Ok(Self {
      detector,
      evaluation,
      images: images.into(),
    })
  }

  /// 照片对应的图像路径：标注中给出的相对路径，缺省为照片标识
  pub fn image_path(&self, photo: &str, labels: &PhotoLabels) -> PathBuf {
    self.images.join(labels.image.as_deref().unwrap_or(photo))
  }

  /// 评测一张已解码的照片
  ///
  /// 号码布框与号码直接比较识别结果；关联评分以标注框为输入推断关联，
  /// 与标注的关联比较。
  pub fn evaluate_photo<S: TextService>(
    &self,
    photo: &str,
    labels: &PhotoLabels,
    image: &DynamicImage,
    service: &S,
  ) -> anyhow::Result<PhotoReport> {
    let iou = self.evaluation.iou_threshold;
    let output = self
      .detector
      .detect(image, service)
      .with_context(|| format!("识别照片 {} 失败", photo))?;

    let (width, height) = output.original_size;
    let predicted: Vec<BoxRect> = output
      .detections
      .iter()
      .map(|d| d.box_rect().normalized(width, height))
      .collect();
    let bib_boxes = match_boxes(&predicted, &labels.eligible_bibs(), iou);

    let detected: Vec<String> = output.detections.iter().map(|d| d.bib_number.clone()).collect();
    let expected: Vec<String> = labels.bib_numbers().into_iter().map(str::to_string).collect();
    let bib_numbers = score_bib_numbers(
      detected.iter().map(String::as_str),
      expected.iter().map(String::as_str),
    );

    let predicted_links = predict_links(&labels.bibs, &labels.faces);
    let links = score_links(
      &predicted_links,
      &labels.bibs,
      &labels.faces,
      &labels.eligible_links(),
      iou,
    );

    Ok(PhotoReport {
      photo: photo.to_string(),
      detected,
      expected,
      bib_boxes,
      bib_numbers,
      links,
    })
  }

  /// 汇总单张照片的评测结果
  pub fn summarize(
    &self,
    photo_count: usize,
    photos: Vec<PhotoReport>,
    failed_photos: Vec<FailedPhoto>,
  ) -> BenchmarkReport {
    let mut bib_boxes = Scorecard::default();
    let mut bib_numbers = Scorecard::default();
    let mut links = LinkScorecard::default();
    for report in &photos {
      bib_boxes.add(&report.bib_boxes);
      bib_numbers.add(&report.bib_numbers);
      links.add(&report.links);
    }

    BenchmarkReport {
      generated_at: chrono::Utc::now().to_rfc3339(),
      iou_threshold: self.evaluation.iou_threshold,
      photo_count,
      evaluated_count: photos.len(),
      bib_boxes: bib_boxes.report(),
      bib_numbers: bib_numbers.report(),
      links: links.report(),
      failed_photos,
      photos,
    }
  }

  #[cfg(feature = "read_image_file")]
  pub fn run<S: TextService>(&self, truth: &GroundTruthSet, service: &S) -> BenchmarkReport {
    let mut photos = Vec::new();
    let mut failed = Vec::new();

    for (photo, labels) in truth.iter() {
      let path = self.image_path(photo, labels);
      let result = crate::input::load_image(&path)
        .map_err(anyhow::Error::from)
        .and_then(|image| self.evaluate_photo(photo, labels, &image, service));
      match result {
        Ok(report) => {
          info!(
            "{}: 号码 {:?} / 标注 {:?}",
            photo, report.detected, report.expected
          );
          photos.push(report);
        }
        Err(err) => {
          warn!("评测照片 {} 失败: {:#}", photo, err);
          failed.push(FailedPhoto {
            photo: photo.to_string(),
            error: format!("{:#}", err),
          });
        }
      }
    }

    self.summarize(truth.len(), photos, failed)
  }
}

#[cfg(feature = "read_image_file")]
impl<'a, S, W> Task<&'a GroundTruthSet, S, W> for BenchmarkTask
where
  S: TextService,
  W: std::io::Write,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: &'a GroundTruthSet,
    service: S,
    mut output: W,
  ) -> Result<(), Self::Error> {
    info!("开始评测任务: {} 张照片", input.len());
    let now = std::time::Instant::now();
    let report = self.run(input, &service);
    info!(
      "评测完成, 耗时 {:.2?}: 号码布框 P={:.3} R={:.3} F1={:.3}, 号码 P={:.3} R={:.3} F1={:.3}, 失败 {} 张",
      now.elapsed(),
      report.bib_boxes.precision,
      report.bib_boxes.recall,
      report.bib_boxes.f1,
      report.bib_numbers.precision,
      report.bib_numbers.recall,
      report.bib_numbers.f1,
      report.failed_photos.len()
    );
    serde_json::to_writer_pretty(&mut output, &report).context("写入评测报告失败")?;
    writeln!(output)?;
    Ok(())
  }
}
