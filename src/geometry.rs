// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/geometry.rs - 边界框与四边形几何
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

use serde::{Deserialize, Serialize};

/// 轴对齐矩形 (x, y, w, h)
///
/// 坐标系由使用方决定：像素坐标或 `[0,1]` 归一化坐标均可，
/// 但参与同一次比较的两个矩形必须处于同一坐标系。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoxRect {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
}

impl BoxRect {
  pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
    Self { x, y, w, h }
  }

  /// 由左上角与右下角构造，右下角小于左上角时宽高为 0
  pub fn from_corners(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
    Self {
      x: x_min,
      y: y_min,
      w: (x_max - x_min).max(0.0),
      h: (y_max - y_min).max(0.0),
    }
  }

  pub fn right(&self) -> f32 {
    self.x + self.w
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.h
  }

  pub fn area(&self) -> f32 {
    self.w.max(0.0) * self.h.max(0.0)
  }

  pub fn centroid(&self) -> [f32; 2] {
    [self.x + self.w / 2.0, self.y + self.h / 2.0]
  }

  pub fn contains_point(&self, point: [f32; 2]) -> bool {
    point[0] >= self.x
      && point[0] <= self.right()
      && point[1] >= self.y
      && point[1] <= self.bottom()
  }

  pub fn intersection_area(&self, other: &BoxRect) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = self.right().min(other.right());
    let y2 = self.bottom().min(other.bottom());
    (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
  }

  /// 交并比，并集为 0 时返回 0
  pub fn iou(&self, other: &BoxRect) -> f32 {
    let intersection = self.intersection_area(other);
    let union = self.area() + other.area() - intersection;
    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }

  /// 交集占较小矩形面积的比例
  pub fn coverage_of_smaller(&self, other: &BoxRect) -> f32 {
    let smaller = self.area().min(other.area());
    if smaller > 0.0 {
      self.intersection_area(other) / smaller
    } else {
      0.0
    }
  }

  pub fn scale(&self, factor: f32) -> BoxRect {
    BoxRect::new(
      self.x * factor,
      self.y * factor,
      self.w * factor,
      self.h * factor,
    )
  }

  /// 像素坐标转为 `[0,1]` 归一化坐标
  pub fn normalized(&self, image_width: u32, image_height: u32) -> BoxRect {
    let (iw, ih) = (image_width.max(1) as f32, image_height.max(1) as f32);
    BoxRect::new(self.x / iw, self.y / ih, self.w / iw, self.h / ih)
  }

  /// `[0,1]` 归一化坐标转为像素坐标
  pub fn to_pixels(&self, image_width: u32, image_height: u32) -> BoxRect {
    let (iw, ih) = (image_width as f32, image_height as f32);
    BoxRect::new(self.x * iw, self.y * ih, self.w * iw, self.h * ih)
  }

  pub fn distance(&self, other: &BoxRect) -> f32 {
    let [ax, ay] = self.centroid();
    let [bx, by] = other.centroid();
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
  }
}

impl From<imageproc::rect::Rect> for BoxRect {
  fn from(rect: imageproc::rect::Rect) -> Self {
    BoxRect::new(
      rect.left() as f32,
      rect.top() as f32,
      rect.width() as f32,
      rect.height() as f32,
    )
  }
}

/// 四点多边形，点序为文字识别引擎给出的顺序（通常为顺时针，从左上开始）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quad(pub [[f32; 2]; 4]);

impl Quad {
  pub fn from_rect(rect: &BoxRect) -> Self {
    Quad([
      [rect.x, rect.y],
      [rect.right(), rect.y],
      [rect.right(), rect.bottom()],
      [rect.x, rect.bottom()],
    ])
  }

  pub fn points(&self) -> &[[f32; 2]; 4] {
    &self.0
  }

  /// 外接轴对齐矩形
  pub fn bounding_rect(&self) -> BoxRect {
    let xs = self.0.iter().map(|p| p[0]);
    let ys = self.0.iter().map(|p| p[1]);
    let x_min = xs.clone().fold(f32::INFINITY, f32::min);
    let x_max = xs.fold(f32::NEG_INFINITY, f32::max);
    let y_min = ys.clone().fold(f32::INFINITY, f32::min);
    let y_max = ys.fold(f32::NEG_INFINITY, f32::max);
    BoxRect::from_corners(x_min, y_min, x_max, y_max)
  }

  pub fn offset(&self, dx: f32, dy: f32) -> Quad {
    Quad(self.0.map(|[x, y]| [x + dx, y + dy]))
  }

  pub fn scale(&self, factor: f32) -> Quad {
    Quad(self.0.map(|[x, y]| [x * factor, y * factor]))
  }
}

/// 可参与 IoU 计算的框
pub trait AsBoxRect {
  fn box_rect(&self) -> BoxRect;
}

impl AsBoxRect for BoxRect {
  fn box_rect(&self) -> BoxRect {
    *self
  }
}

impl AsBoxRect for Quad {
  fn box_rect(&self) -> BoxRect {
    self.bounding_rect()
  }
}

impl<T: AsBoxRect + ?Sized> AsBoxRect for &T {
  fn box_rect(&self) -> BoxRect {
    (**self).box_rect()
  }
}
