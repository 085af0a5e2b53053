// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/config.rs - 流水线阈值配置
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BibError, BibResult};

/// 归一化宽度允许的最小值，过小的图像不足以识别号码
pub const MIN_TARGET_WIDTH: u32 = 320;
/// 归一化宽度允许的最大值
pub const MAX_TARGET_WIDTH: u32 = 8000;

/// 预处理配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
  /// 归一化目标宽度，`None` 表示保持原始宽度
  pub target_width: Option<u32>,
  /// 是否允许局部对比度增强
  pub contrast_enabled: bool,
  /// 动态范围（P95 - P5）低于该值时才执行对比度增强
  pub dynamic_range_threshold: u8,
  /// 分块直方图均衡的裁剪上限（相对平均直方图高度的倍数）
  pub clip_limit: f32,
  /// 分块数量（每个方向）
  pub tile_grid: u32,
}

impl Default for PreprocessConfig {
  fn default() -> Self {
    Self {
      target_width: Some(1280),
      contrast_enabled: true,
      dynamic_range_threshold: 100,
      clip_limit: 2.0,
      tile_grid: 8,
    }
  }
}

impl PreprocessConfig {
  pub fn validate(&self) -> BibResult<()> {
    if let Some(width) = self.target_width {
      if !(MIN_TARGET_WIDTH..=MAX_TARGET_WIDTH).contains(&width) {
        return Err(BibError::invalid_config(format!(
          "目标宽度 {} 不在 [{}, {}] 范围内",
          width, MIN_TARGET_WIDTH, MAX_TARGET_WIDTH
        )));
      }
    }
    if !(self.clip_limit > 0.0) {
      return Err(BibError::invalid_config(format!(
        "直方图裁剪上限必须为正数: {}",
        self.clip_limit
      )));
    }
    if self.tile_grid == 0 || self.tile_grid > 64 {
      return Err(BibError::invalid_config(format!(
        "分块数量 {} 不在 [1, 64] 范围内",
        self.tile_grid
      )));
    }
    Ok(())
  }
}

/// 候选区域检测配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
  /// 二值化亮度阈值，大于该值的像素视为亮区
  pub brightness_cutoff: u8,
  /// 轮廓最小面积（像素）
  pub min_contour_area: f32,
  pub min_aspect: f32,
  pub max_aspect: f32,
  /// 外接矩形面积 / 图像面积 的下限
  pub min_relative_area: f32,
  pub max_relative_area: f32,
  pub min_median_brightness: u8,
  pub min_mean_brightness: f32,
  /// 通过的候选框向外扩展 `min(w, h)` 的比例
  pub padding_fraction: f32,
}

impl Default for CandidateConfig {
  fn default() -> Self {
    Self {
      brightness_cutoff: 180,
      min_contour_area: 300.0,
      min_aspect: 0.5,
      max_aspect: 4.0,
      min_relative_area: 0.0005,
      max_relative_area: 0.25,
      min_median_brightness: 150,
      min_mean_brightness: 120.0,
      padding_fraction: 0.15,
    }
  }
}

impl CandidateConfig {
  pub fn validate(&self) -> BibResult<()> {
    check_ordered("宽高比", self.min_aspect, self.max_aspect)?;
    check_ordered("相对面积", self.min_relative_area, self.max_relative_area)?;
    check_unit("相对面积上限", self.max_relative_area)?;
    if !(self.min_contour_area >= 0.0) {
      return Err(BibError::invalid_config("轮廓最小面积不能为负"));
    }
    if !(0.0..=255.0).contains(&self.min_mean_brightness) {
      return Err(BibError::invalid_config(format!(
        "平均亮度阈值 {} 不在 [0, 255] 范围内",
        self.min_mean_brightness
      )));
    }
    if !(0.0..=1.0).contains(&self.padding_fraction) {
      return Err(BibError::invalid_config(format!(
        "扩展比例 {} 不在 [0, 1] 范围内",
        self.padding_fraction
      )));
    }
    Ok(())
  }
}

/// 文字提取配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
  /// 区域识别结果的置信度下限（严格大于）
  pub region_min_confidence: f32,
  /// 全图识别结果的置信度下限（严格大于）
  pub full_image_min_confidence: f32,
  /// 全图识别框下像素的中位亮度下限
  pub full_image_min_median_brightness: u8,
  /// 全图识别框下像素的平均亮度下限
  pub full_image_min_mean_brightness: f32,
  /// 区域识别框面积 / 候选框面积 的下限
  pub min_hit_area_fraction: f32,
}

impl Default for ExtractConfig {
  fn default() -> Self {
    Self {
      region_min_confidence: 0.4,
      full_image_min_confidence: 0.5,
      full_image_min_median_brightness: 120,
      full_image_min_mean_brightness: 100.0,
      min_hit_area_fraction: 0.1,
    }
  }
}

impl ExtractConfig {
  pub fn validate(&self) -> BibResult<()> {
    check_unit("区域置信度下限", self.region_min_confidence)?;
    check_unit("全图置信度下限", self.full_image_min_confidence)?;
    check_unit("识别框面积比例", self.min_hit_area_fraction)?;
    if !(0.0..=255.0).contains(&self.full_image_min_mean_brightness) {
      return Err(BibError::invalid_config(format!(
        "全图平均亮度阈值 {} 不在 [0, 255] 范围内",
        self.full_image_min_mean_brightness
      )));
    }
    Ok(())
  }
}

/// 号码取值范围
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BibRangeConfig {
  pub min_bib: u32,
  pub max_bib: u32,
}

impl Default for BibRangeConfig {
  fn default() -> Self {
    Self {
      min_bib: 1,
      max_bib: 9999,
    }
  }
}

impl BibRangeConfig {
  pub fn validate(&self) -> BibResult<()> {
    if self.min_bib == 0 {
      return Err(BibError::invalid_config("号码下限必须大于 0"));
    }
    if self.min_bib > self.max_bib {
      return Err(BibError::invalid_config(format!(
        "号码范围无效: [{}, {}]",
        self.min_bib, self.max_bib
      )));
    }
    Ok(())
  }

  /// 号码最大位数，即 `max_bib` 的十进制位数
  pub fn max_digits(&self) -> usize {
    self.max_bib.to_string().len()
  }
}

/// 重叠消解配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
  pub iou_threshold: f32,
  /// 交集占较小框面积的比例阈值
  pub coverage_threshold: f32,
  /// 子串冲突时，短号码置信度需超过长号码置信度的该倍数才保留短号码
  pub substring_confidence_ratio: f32,
}

impl Default for ResolveConfig {
  fn default() -> Self {
    Self {
      iou_threshold: 0.3,
      coverage_threshold: 0.8,
      substring_confidence_ratio: 1.5,
    }
  }
}

impl ResolveConfig {
  pub fn validate(&self) -> BibResult<()> {
    check_unit("重叠 IoU 阈值", self.iou_threshold)?;
    check_unit("覆盖率阈值", self.coverage_threshold)?;
    if !(self.substring_confidence_ratio > 0.0) {
      return Err(BibError::invalid_config(format!(
        "子串置信度倍数必须为正数: {}",
        self.substring_confidence_ratio
      )));
    }
    Ok(())
  }
}

/// 单张照片识别流水线的全部配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub preprocess: PreprocessConfig,
  pub candidate: CandidateConfig,
  pub extract: ExtractConfig,
  pub bib_range: BibRangeConfig,
  pub resolve: ResolveConfig,
}

impl PipelineConfig {
  pub fn validate(&self) -> BibResult<()> {
    self.preprocess.validate()?;
    self.candidate.validate()?;
    self.extract.validate()?;
    self.bib_range.validate()?;
    self.resolve.validate()?;
    Ok(())
  }

  /// 从 JSON 文件读取配置，未出现的字段使用默认值
  pub fn from_json_file(path: impl AsRef<Path>) -> BibResult<Self> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
      BibError::invalid_config(format!("无法读取配置文件 {}: {}", path.display(), e))
    })?;
    let config = Self::from_json_str(&text)?;
    debug!("已加载配置文件: {}", path.display());
    Ok(config)
  }

  pub fn from_json_str(text: &str) -> BibResult<Self> {
    let config: PipelineConfig = serde_json::from_str(text)
      .map_err(|e| BibError::invalid_config(format!("配置解析失败: {}", e)))?;
    config.validate()?;
    Ok(config)
  }
}

/// 评估配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
  pub iou_threshold: f32,
}

impl Default for EvaluationConfig {
  fn default() -> Self {
    Self { iou_threshold: 0.5 }
  }
}

impl EvaluationConfig {
  pub fn validate(&self) -> BibResult<()> {
    check_unit("评估 IoU 阈值", self.iou_threshold)
  }
}

fn check_unit(name: &str, value: f32) -> BibResult<()> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(BibError::invalid_config(format!(
      "{} {} 不在 [0, 1] 范围内",
      name, value
    )))
  }
}

fn check_ordered(name: &str, min: f32, max: f32) -> BibResult<()> {
  if min.is_finite() && max.is_finite() && min >= 0.0 && min <= max {
    Ok(())
  } else {
    Err(BibError::invalid_config(format!(
      "{}范围无效: [{}, {}]",
      name, min, max
    )))
  }
}
