// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/ground_truth.rs - 人工标注数据读取
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
  collections::{BTreeMap, HashSet},
  path::Path,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  geometry::{AsBoxRect, BoxRect},
  link::{Link, LinkCandidate},
};

#[derive(Error, Debug)]
pub enum GroundTruthError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标注解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("照片 {photo} 的第 {index} 个{kind}框坐标无效")]
  InvalidBox {
    photo: String,
    kind: &'static str,
    index: usize,
  },
  #[error("照片 {photo} 的关联 {link:?} 引用了不存在的框")]
  LinkOutOfRange { photo: String, link: Link },
  #[error("照片 {photo} 的关联 {link:?} 重复")]
  DuplicateLink { photo: String, link: Link },
}

/// 号码布标注范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BibScope {
  #[default]
  Bib,
  BibPartial,
  BibObscured,
  NotBib,
}

/// 人脸标注范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceScope {
  #[default]
  Keep,
  Exclude,
  Uncertain,
}

/// 号码布标注框，坐标归一化到 `[0,1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BibBox {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
  #[serde(default)]
  pub number: String,
  #[serde(default)]
  pub scope: BibScope,
}

/// 人脸标注框，坐标归一化到 `[0,1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
  #[serde(default)]
  pub scope: FaceScope,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub identity: Option<String>,
}

impl AsBoxRect for BibBox {
  fn box_rect(&self) -> BoxRect {
    BoxRect::new(self.x, self.y, self.w, self.h)
  }
}

impl AsBoxRect for FaceBox {
  fn box_rect(&self) -> BoxRect {
    BoxRect::new(self.x, self.y, self.w, self.h)
  }
}

impl LinkCandidate for BibBox {
  fn eligible(&self) -> bool {
    self.scope != BibScope::NotBib
  }
}

impl LinkCandidate for FaceBox {
  fn eligible(&self) -> bool {
    self.scope != FaceScope::Exclude
  }
}

/// 一张照片的标注
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoLabels {
  /// 图像文件相对于图像目录的路径，缺省时使用照片标识
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
  pub bibs: Vec<BibBox>,
  pub faces: Vec<FaceBox>,
  pub links: Vec<Link>,
}

impl PhotoLabels {
  /// 参与评分的号码布框
  pub fn eligible_bibs(&self) -> Vec<&BibBox> {
    self.bibs.iter().filter(|b| b.eligible()).collect()
  }

  /// 参与评分的人脸框
  pub fn eligible_faces(&self) -> Vec<&FaceBox> {
    self.faces.iter().filter(|f| f.eligible()).collect()
  }

  /// 参与评分的号码，每个号码只出现一次
  pub fn bib_numbers(&self) -> Vec<&str> {
    let mut seen = HashSet::new();
    self
      .bibs
      .iter()
      .filter(|b| b.eligible() && !b.number.is_empty())
      .map(|b| b.number.as_str())
      .filter(|n| seen.insert(*n))
      .collect()
  }

  /// 两端都参与评分的关联，下标越界的关联被忽略
  pub fn eligible_links(&self) -> Vec<Link> {
    self
      .links
      .iter()
      .copied()
      .filter(|link| {
        let bib = self.bibs.get(link.bib).is_some_and(|b| b.eligible());
        let face = self.faces.get(link.face).is_some_and(|f| f.eligible());
        bib && face
      })
      .collect()
  }

  fn validate(&self, photo: &str) -> Result<(), GroundTruthError> {
    let bad = |rect: BoxRect| {
      let values = [rect.x, rect.y, rect.w, rect.h];
      values.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 1.0)
    };
    if let Some(index) = self.bibs.iter().position(|b| bad(b.box_rect())) {
      return Err(GroundTruthError::InvalidBox {
        photo: photo.to_string(),
        kind: "号码布",
        index,
      });
    }
    if let Some(index) = self.faces.iter().position(|f| bad(f.box_rect())) {
      return Err(GroundTruthError::InvalidBox {
        photo: photo.to_string(),
        kind: "人脸",
        index,
      });
    }

    let mut seen = HashSet::new();
    for link in &self.links {
      if link.bib >= self.bibs.len() || link.face >= self.faces.len() {
        return Err(GroundTruthError::LinkOutOfRange {
          photo: photo.to_string(),
          link: *link,
        });
      }
      if !seen.insert(*link) {
        return Err(GroundTruthError::DuplicateLink {
          photo: photo.to_string(),
          link: *link,
        });
      }
    }
    Ok(())
  }
}

/// 全部照片的标注，只读
///
/// ```json
/// {"photos": {"a1b2c3": {"bibs": [{"x": 0.4, "y": 0.5, "w": 0.1, "h": 0.05, "number": "123"}],
///                        "faces": [{"x": 0.41, "y": 0.2, "w": 0.08, "h": 0.1}],
///                        "links": [[0, 0]]}}}
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroundTruthSet {
  photos: BTreeMap<String, PhotoLabels>,
}

impl GroundTruthSet {
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, GroundTruthError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let set = Self::from_json_str(&text)?;
    info!("已加载标注 {}: {} 张照片", path.display(), set.len());
    Ok(set)
  }

  pub fn from_json_str(text: &str) -> Result<Self, GroundTruthError> {
    let set: GroundTruthSet = serde_json::from_str(text)?;
    for (photo, labels) in &set.photos {
      labels.validate(photo)?;
    }
    debug!("标注校验通过: {} 张照片", set.len());
    Ok(set)
  }

  pub fn len(&self) -> usize {
    self.photos.len()
  }

  pub fn is_empty(&self) -> bool {
    self.photos.is_empty()
  }

  pub fn get(&self, photo: &str) -> Option<&PhotoLabels> {
    self.photos.get(photo)
  }

  /// 按照片标识排序遍历
  pub fn iter(&self) -> impl Iterator<Item = (&str, &PhotoLabels)> {
    self.photos.iter().map(|(id, labels)| (id.as_str(), labels))
  }
}
