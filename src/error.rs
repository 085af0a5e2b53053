// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/error.rs - 错误定义
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

use thiserror::Error;

/// 识别流水线错误
///
/// 单张照片的处理要么得到完整的检测列表，要么返回其中一种错误，不存在部分结果。
#[derive(Error, Debug)]
pub enum BibError {
  /// 输入图像为空、尺寸非法或通道数不受支持
  #[error("图像无效: {0}")]
  InvalidImage(String),
  /// 配置阈值越界，在任何处理开始之前报告
  #[error("配置无效: {0}")]
  InvalidConfig(String),
  /// 外部文字识别服务失败，不做重试
  #[error("文字识别服务失败: {0}")]
  TextServiceFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BibError {
  pub fn invalid_image(msg: impl Into<String>) -> Self {
    BibError::InvalidImage(msg.into())
  }

  pub fn invalid_config(msg: impl Into<String>) -> Self {
    BibError::InvalidConfig(msg.into())
  }

  pub fn text_service<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    BibError::TextServiceFailure(Box::new(err))
  }
}

pub type BibResult<T> = Result<T, BibError>;
