// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::{DynamicImage, ImageReader};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::Photo};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误 ({path}): {source}")]
  IoError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("图像解码错误 ({path}): {source}")]
  ImageLoadError {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

/// 目录输入时识别的扩展名
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// 读取并解码一张图像
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage, ImageFileInputError> {
  let path = path.as_ref();
  let io_error = |source| ImageFileInputError::IoError {
    path: path.to_path_buf(),
    source,
  };
  ImageReader::open(path)
    .map_err(io_error)?
    .with_guessed_format()
    .map_err(io_error)?
    .decode()
    .map_err(|source| ImageFileInputError::ImageLoadError {
      path: path.to_path_buf(),
      source,
    })
}

/// 单个图像文件或目录下全部图像
///
/// `image:///data/race/IMG_0001.jpg` 或 `image:///data/race/`，
/// 目录按文件名排序，逐张解码。
#[derive(Debug, Clone)]
pub struct ImageFileInput {
  paths: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(url.path())
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let io_error = |source| ImageFileInputError::IoError {
      path: path.to_path_buf(),
      source,
    };

    let metadata = std::fs::metadata(path).map_err(io_error)?;
    let paths = if metadata.is_dir() {
      let mut paths = Vec::new();
      for entry in std::fs::read_dir(path).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let file = entry.path();
        if file.is_file() && has_image_extension(&file) {
          paths.push(file);
        }
      }
      paths.sort();
      debug!("目录 {} 中共有 {} 张图像", path.display(), paths.len());
      paths
    } else {
      vec![path.to_path_buf()]
    };

    Ok(Self {
      paths: paths.into(),
    })
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }
}

fn has_image_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      IMAGE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
    })
    .unwrap_or(false)
}

impl Iterator for ImageFileInput {
  type Item = Result<Photo, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.paths.pop_front()?;
    let id = path
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_default();
    Some(load_image(&path).map(|image| Photo { id, path, image }))
  }
}
