// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/text_service.rs - 外部文字识别服务接口
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

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::geometry::Quad;

/// 文字识别服务的单条输出，坐标相对于传入图像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTextHit {
  pub bbox: Quad,
  pub text: String,
  pub confidence: f32,
}

impl RawTextHit {
  pub fn new(bbox: Quad, text: impl Into<String>, confidence: f32) -> Self {
    Self {
      bbox,
      text: text.into(),
      confidence,
    }
  }
}

/// 文字识别服务
///
/// 任何满足该接口的引擎都可替换使用，流水线不做重试。
pub trait TextService {
  type Error: std::error::Error + Send + Sync + 'static;

  fn read_text(&self, image: &GrayImage) -> Result<Vec<RawTextHit>, Self::Error>;
}

impl<T: TextService + ?Sized> TextService for &T {
  type Error = T::Error;

  fn read_text(&self, image: &GrayImage) -> Result<Vec<RawTextHit>, Self::Error> {
    (**self).read_text(image)
  }
}

#[cfg(feature = "exec_text_service")]
mod exec;
#[cfg(feature = "exec_text_service")]
pub use self::exec::{ExecTextService, ExecTextServiceError};
