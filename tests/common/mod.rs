// 该文件是 Bibscan （号码布识别） 项目的一部分。
// tests/common/mod.rs - 集成测试公用的合成图像与模拟识别服务
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

#![allow(dead_code)]

use std::cell::RefCell;

use bibscan::{
  PipelineConfig,
  geometry::{BoxRect, Quad},
  text_service::{RawTextHit, TextService},
};
use image::{DynamicImage, GrayImage, Luma};

/// 640x480 暗色背景，(200,150) 处有一块 240x150 的亮色号码布
pub const SCENE_SIZE: (u32, u32) = (640, 480);
pub const BIB_RECT: BoxRect = BoxRect::new(200.0, 150.0, 240.0, 150.0);

pub fn scene() -> DynamicImage {
  let mut gray = GrayImage::from_pixel(SCENE_SIZE.0, SCENE_SIZE.1, Luma([40]));
  let (x, y, w, h) = (
    BIB_RECT.x as u32,
    BIB_RECT.y as u32,
    BIB_RECT.w as u32,
    BIB_RECT.h as u32,
  );
  for yy in y..y + h {
    for xx in x..x + w {
      gray.put_pixel(xx, yy, Luma([230]));
    }
  }
  DynamicImage::ImageLuma8(gray)
}

pub fn config_with_width(target_width: Option<u32>) -> PipelineConfig {
  let mut config = PipelineConfig::default();
  config.preprocess.target_width = target_width;
  config
}

#[derive(Debug, thiserror::Error)]
#[error("模拟识别服务失败")]
pub struct MockError;

/// 把图像中亮色像素的外接矩形当作一段文字返回
///
/// 传入的是全图还是裁剪区域，由图像宽度是否等于 `full_width` 判断。
pub struct BrightTextService {
  pub text: String,
  pub confidence: f32,
  pub full_width: u32,
  pub on_full_image: bool,
  pub on_regions: bool,
  pub calls: RefCell<Vec<(u32, u32)>>,
}

impl BrightTextService {
  pub fn new(text: &str, confidence: f32, full_width: u32) -> Self {
    Self {
      text: text.to_string(),
      confidence,
      full_width,
      on_full_image: true,
      on_regions: true,
      calls: RefCell::new(Vec::new()),
    }
  }

  pub fn regions_only(mut self) -> Self {
    self.on_full_image = false;
    self
  }

  pub fn full_image_only(mut self) -> Self {
    self.on_regions = false;
    self
  }
}

pub fn bright_bounds(image: &GrayImage) -> Option<BoxRect> {
  let mut bounds: Option<(u32, u32, u32, u32)> = None;
  for (x, y, pixel) in image.enumerate_pixels() {
    if pixel.0[0] > 200 {
      bounds = Some(match bounds {
        None => (x, y, x, y),
        Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
      });
    }
  }
  bounds.map(|(x0, y0, x1, y1)| {
    BoxRect::from_corners(x0 as f32, y0 as f32, (x1 + 1) as f32, (y1 + 1) as f32)
  })
}

impl TextService for BrightTextService {
  type Error = MockError;

  fn read_text(&self, image: &GrayImage) -> Result<Vec<RawTextHit>, MockError> {
    self.calls.borrow_mut().push(image.dimensions());
    let is_full = image.width() == self.full_width;
    if (is_full && !self.on_full_image) || (!is_full && !self.on_regions) {
      return Ok(Vec::new());
    }
    Ok(
      bright_bounds(image)
        .map(|rect| RawTextHit::new(Quad::from_rect(&rect), self.text.as_str(), self.confidence))
        .into_iter()
        .collect(),
    )
  }
}

/// 总是失败的识别服务
pub struct FailingTextService;

impl TextService for FailingTextService {
  type Error = MockError;

  fn read_text(&self, _image: &GrayImage) -> Result<Vec<RawTextHit>, MockError> {
    Err(MockError)
  }
}

pub fn assert_close(actual: BoxRect, expected: BoxRect, tolerance: f32) {
  let pairs = [
    (actual.x, expected.x),
    (actual.y, expected.y),
    (actual.w, expected.w),
    (actual.h, expected.h),
  ];
  assert!(
    pairs.iter().all(|(a, e)| (a - e).abs() <= tolerance),
    "{:?} 与 {:?} 相差超过 {}",
    actual,
    expected,
    tolerance
  );
}
