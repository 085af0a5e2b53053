// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/preprocess.rs - 图像归一化预处理
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

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, Rgba, imageops};
use serde::Serialize;
use tracing::debug;

use crate::{
  config::PreprocessConfig,
  error::{BibError, BibResult},
};

/// 对比度增强的执行记录，供诊断解释为何执行或跳过
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ContrastDecision {
  /// 动态范围低于阈值，已执行分块直方图均衡
  Applied { dynamic_range: u8, threshold: u8 },
  /// 动态范围足够，跳过
  Declined { dynamic_range: u8, threshold: u8 },
  /// 配置关闭了对比度增强
  Disabled,
}

impl ContrastDecision {
  pub fn applied(&self) -> bool {
    matches!(self, ContrastDecision::Applied { .. })
  }
}

/// 归一化后的单通道图像
///
/// 创建后不可变，`scale_factor` 为 原始宽度 / 归一化宽度。
#[derive(Debug, Clone)]
pub struct NormalizedImage {
  image: GrayImage,
  scale_factor: f32,
  original_width: u32,
  original_height: u32,
  contrast: ContrastDecision,
}

impl NormalizedImage {
  pub fn image(&self) -> &GrayImage {
    &self.image
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn scale_factor(&self) -> f32 {
    self.scale_factor
  }

  pub fn original_width(&self) -> u32 {
    self.original_width
  }

  pub fn original_height(&self) -> u32 {
    self.original_height
  }

  pub fn contrast(&self) -> ContrastDecision {
    self.contrast
  }
}

/// 由原始像素缓冲构造图像，支持 1/3/4 通道
pub fn image_from_raw(
  width: u32,
  height: u32,
  channels: u8,
  data: Vec<u8>,
) -> BibResult<DynamicImage> {
  if width == 0 || height == 0 {
    return Err(BibError::invalid_image(format!(
      "图像尺寸为空: {}x{}",
      width, height
    )));
  }
  let len = data.len();
  let image = match channels {
    1 => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
    3 => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
    4 => ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
    other => {
      return Err(BibError::invalid_image(format!("不支持的通道数: {}", other)));
    }
  };
  image.ok_or_else(|| {
    BibError::invalid_image(format!(
      "数据长度不匹配: 期望长度 {}, 实际长度 {}",
      width as usize * height as usize * channels as usize,
      len
    ))
  })
}

/// 预处理器
#[derive(Debug, Clone)]
pub struct Preprocessor {
  config: PreprocessConfig,
}

impl Preprocessor {
  pub fn new(config: PreprocessConfig) -> BibResult<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &PreprocessConfig {
    &self.config
  }

  /// 灰度化、按目标宽度等比缩放，并在动态范围不足时做局部对比度增强
  pub fn normalize(&self, image: &DynamicImage) -> BibResult<NormalizedImage> {
    let (original_width, original_height) = (image.width(), image.height());
    if original_width == 0 || original_height == 0 {
      return Err(BibError::invalid_image(format!(
        "图像尺寸为空: {}x{}",
        original_width, original_height
      )));
    }

    let channels = image.color().channel_count();
    if !matches!(channels, 1 | 3 | 4) {
      return Err(BibError::invalid_image(format!("不支持的通道数: {}", channels)));
    }
    let gray = image.to_luma8();

    let (resized, scale_factor) = match self.config.target_width {
      Some(target) if target != original_width => {
        let target_height = ((original_height as f64 * target as f64 / original_width as f64)
          .round() as u32)
          .max(1);
        let resized = if target < original_width {
          // 缩小时使用区域平均
          imageops::thumbnail(&gray, target, target_height)
        } else {
          imageops::resize(&gray, target, target_height, imageops::FilterType::Triangle)
        };
        debug!(
          "缩放图像: {}x{} -> {}x{}",
          original_width, original_height, target, target_height
        );
        (resized, original_width as f32 / target as f32)
      }
      _ => (gray, 1.0),
    };

    let (image, contrast) = self.enhance_contrast(resized);
    debug!("对比度增强: {:?}", contrast);

    Ok(NormalizedImage {
      image,
      scale_factor,
      original_width,
      original_height,
      contrast,
    })
  }

  fn enhance_contrast(&self, image: GrayImage) -> (GrayImage, ContrastDecision) {
    if !self.config.contrast_enabled {
      return (image, ContrastDecision::Disabled);
    }
    let threshold = self.config.dynamic_range_threshold;
    let dynamic_range = dynamic_range(&image);
    if dynamic_range < threshold {
      let equalized = equalize_tiles(&image, self.config.tile_grid, self.config.clip_limit);
      (
        equalized,
        ContrastDecision::Applied {
          dynamic_range,
          threshold,
        },
      )
    } else {
      (
        image,
        ContrastDecision::Declined {
          dynamic_range,
          threshold,
        },
      )
    }
  }
}

/// P95 与 P5 亮度之差
pub fn dynamic_range(image: &GrayImage) -> u8 {
  let low = imageproc::stats::percentile(image, 5);
  let high = imageproc::stats::percentile(image, 95);
  high.saturating_sub(low)
}

/// 带裁剪的分块直方图均衡，块间双线性插值
fn equalize_tiles(image: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
  let (width, height) = image.dimensions();
  let tile_w = width.div_ceil(grid.min(width).max(1));
  let tile_h = height.div_ceil(grid.min(height).max(1));
  let grid_x = width.div_ceil(tile_w);
  let grid_y = height.div_ceil(tile_h);

  let mut luts = Vec::with_capacity((grid_x * grid_y) as usize);
  for ty in 0..grid_y {
    for tx in 0..grid_x {
      let x0 = tx * tile_w;
      let y0 = ty * tile_h;
      let x1 = (x0 + tile_w).min(width);
      let y1 = (y0 + tile_h).min(height);
      luts.push(tile_lut(image, x0, y0, x1, y1, clip_limit));
    }
  }
  let lut_at = |tx: u32, ty: u32, v: usize| luts[(ty * grid_x + tx) as usize][v] as f32;

  GrayImage::from_fn(width, height, |x, y| {
    let v = image.get_pixel(x, y)[0] as usize;

    let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
    let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
    let tx0 = (fx.floor().max(0.0) as u32).min(grid_x - 1);
    let ty0 = (fy.floor().max(0.0) as u32).min(grid_y - 1);
    let tx1 = (tx0 + 1).min(grid_x - 1);
    let ty1 = (ty0 + 1).min(grid_y - 1);
    let ax = (fx - tx0 as f32).clamp(0.0, 1.0);
    let ay = (fy - ty0 as f32).clamp(0.0, 1.0);

    let top = (1.0 - ax) * lut_at(tx0, ty0, v) + ax * lut_at(tx1, ty0, v);
    let bottom = (1.0 - ax) * lut_at(tx0, ty1, v) + ax * lut_at(tx1, ty1, v);
    let value = (1.0 - ay) * top + ay * bottom;
    Luma([value.round().clamp(0.0, 255.0) as u8])
  })
}

fn tile_lut(image: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
  let mut hist = [0u32; 256];
  for y in y0..y1 {
    for x in x0..x1 {
      hist[image.get_pixel(x, y)[0] as usize] += 1;
    }
  }
  let total: u32 = hist.iter().sum();
  let mut lut = [0u8; 256];
  if total == 0 {
    for (v, slot) in lut.iter_mut().enumerate() {
      *slot = v as u8;
    }
    return lut;
  }

  // 裁剪并均匀回填超出部分
  let limit = ((clip_limit * total as f32 / 256.0) as u32).max(1);
  let mut excess = 0u32;
  for count in hist.iter_mut() {
    if *count > limit {
      excess += *count - limit;
      *count = limit;
    }
  }
  let per_bin = excess / 256;
  let remainder = (excess % 256) as usize;
  for (i, count) in hist.iter_mut().enumerate() {
    *count += per_bin + u32::from(i < remainder);
  }

  let mut cdf = 0u32;
  for (v, count) in hist.iter().enumerate() {
    cdf += count;
    lut[v] = ((cdf as f32 * 255.0 / total as f32).round()).min(255.0) as u8;
  }
  lut
}
