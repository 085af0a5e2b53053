// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/output/directory_record.rs - 按目录记录识别结果
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

use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::Photo,
  output::{
    Render,
    draw::{DrawOverlay, Record},
  },
  pipeline::DetectionOutput,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 每张照片写入 `<目录>/<照片标识>.json`，可选同时保存标注图像
///
/// `folder:///out/records?draw&candidates`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: Record,
  draw: Option<DrawOverlay>,
  /// 没有识别结果时也写入记录
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let has = |key: &str| uri.query_pairs().any(|(k, _)| k == key);
    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record: Record {
        with_candidates: has("candidates"),
      },
      draw: has("draw").then(DrawOverlay::default),
      always: !has("skip_empty"),
    })
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, photo: &Photo, result: &DetectionOutput) -> Result<(), Self::Error> {
    if !self.always && result.detections.is_empty() {
      debug!("照片 {} 没有识别结果，跳过记录", photo.id);
      return Ok(());
    }

    std::fs::create_dir_all(&self.directory)?;
    // 照片标识可能带点号，不能用 with_extension 拼接
    let record_path = self.directory.join(format!("{}.json", photo.id));
    self.record.record(&photo.id, result, &record_path)?;
    if let Some(draw) = &self.draw {
      let image_path = self.directory.join(format!("{}.png", photo.id));
      draw.draw(&photo.image, result).save(image_path)?;
    }
    debug!("已记录照片 {} 到 {}", photo.id, self.directory.display());
    Ok(())
  }
}
