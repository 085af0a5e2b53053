// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/link.rs - 号码布与人脸的关联推断
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

use crate::geometry::{AsBoxRect, BoxRect};

/// 一条关联：照片中号码布列表与人脸列表的下标
///
/// 序列化为 `[bib, face]`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Link {
  pub bib: usize,
  pub face: usize,
}

impl Link {
  pub fn new(bib: usize, face: usize) -> Self {
    Self { bib, face }
  }
}

impl From<(usize, usize)> for Link {
  fn from((bib, face): (usize, usize)) -> Self {
    Self { bib, face }
  }
}

impl From<Link> for (usize, usize) {
  fn from(link: Link) -> Self {
    (link.bib, link.face)
  }
}

/// 可参与关联推断的框
pub trait LinkCandidate: AsBoxRect {
  /// 不合格的框（如标注为“非号码布”）不参与关联
  fn eligible(&self) -> bool {
    true
  }
}

impl LinkCandidate for BoxRect {}

impl<T: LinkCandidate> LinkCandidate for &T {
  fn eligible(&self) -> bool {
    (**self).eligible()
  }
}

/// 人脸下方的躯干区域：自脸框底边起向下两个脸高，
/// 横向以脸中心为准左右各一个脸宽
pub fn torso_region(face: &BoxRect) -> BoxRect {
  let [cx, _] = face.centroid();
  BoxRect::new(cx - face.w, face.bottom(), 2.0 * face.w, 2.0 * face.h)
}

/// 推断关联，返回下标对
pub fn predict_link_indices<B: LinkCandidate, F: LinkCandidate>(
  bibs: &[B],
  faces: &[F],
) -> Vec<Link> {
  let bibs: Vec<(usize, BoxRect)> = bibs
    .iter()
    .enumerate()
    .filter(|(_, b)| b.eligible())
    .map(|(i, b)| (i, b.box_rect()))
    .collect();
  let faces: Vec<(usize, BoxRect)> = faces
    .iter()
    .enumerate()
    .filter(|(_, f)| f.eligible())
    .map(|(i, f)| (i, f.box_rect()))
    .collect();

  if let ([(bib, _)], [(face, _)]) = (bibs.as_slice(), faces.as_slice()) {
    return vec![Link::new(*bib, *face)];
  }

  // 所有落在躯干区域内的 (距离, 人脸, 号码布)，按距离从近到远分配
  let mut pairs = Vec::new();
  for (fi, (_, face)) in faces.iter().enumerate() {
    let torso = torso_region(face);
    for (bi, (_, bib)) in bibs.iter().enumerate() {
      if torso.contains_point(bib.centroid()) {
        pairs.push((face.distance(bib), fi, bi));
      }
    }
  }
  pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

  let mut face_used = vec![false; faces.len()];
  let mut bib_used = vec![false; bibs.len()];
  let mut links = Vec::new();
  for (_, fi, bi) in pairs {
    if face_used[fi] || bib_used[bi] {
      continue;
    }
    face_used[fi] = true;
    bib_used[bi] = true;
    links.push(Link::new(bibs[bi].0, faces[fi].0));
  }
  links.sort();
  links
}

/// 推断号码布与人脸的对应关系
pub fn predict_links<'a, B: LinkCandidate, F: LinkCandidate>(
  bibs: &'a [B],
  faces: &'a [F],
) -> Vec<(&'a B, &'a F)> {
  predict_link_indices(bibs, faces)
    .into_iter()
    .map(|link| (&bibs[link.bib], &faces[link.face]))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Tagged {
    rect: BoxRect,
    eligible: bool,
  }

  impl AsBoxRect for Tagged {
    fn box_rect(&self) -> BoxRect {
      self.rect
    }
  }

  impl LinkCandidate for Tagged {
    fn eligible(&self) -> bool {
      self.eligible
    }
  }

  #[test]
  fn single_face_and_bib_link_unconditionally() {
    // 号码布远在脸上方，不在躯干区域内
    let bibs = [BoxRect::new(0.8, 0.0, 0.1, 0.05)];
    let faces = [BoxRect::new(0.1, 0.6, 0.1, 0.1)];
    assert_eq!(predict_link_indices(&bibs, &faces), vec![Link::new(0, 0)]);
  }

  #[test]
  fn ineligible_bibs_do_not_count_for_the_shortcut() {
    let bibs = [
      Tagged {
        rect: BoxRect::new(0.8, 0.0, 0.1, 0.05),
        eligible: true,
      },
      Tagged {
        rect: BoxRect::new(0.1, 0.75, 0.1, 0.05),
        eligible: false,
      },
    ];
    let faces = [BoxRect::new(0.1, 0.6, 0.1, 0.1)];
    assert_eq!(predict_link_indices(&bibs, &faces), vec![Link::new(0, 0)]);
  }

  #[test]
  fn torso_region_spans_two_face_heights_below() {
    let torso = torso_region(&BoxRect::new(100.0, 50.0, 40.0, 60.0));
    assert_eq!(torso, BoxRect::new(80.0, 110.0, 80.0, 120.0));
  }

  #[test]
  fn each_face_claims_the_nearest_bib_in_its_torso() {
    let faces = [BoxRect::new(100.0, 50.0, 40.0, 40.0), BoxRect::new(300.0, 50.0, 40.0, 40.0)];
    let bibs = [
      BoxRect::new(300.0, 150.0, 40.0, 20.0), // 第二张脸下方
      BoxRect::new(100.0, 110.0, 40.0, 20.0), // 第一张脸下方，较近
      BoxRect::new(100.0, 150.0, 40.0, 20.0), // 第一张脸下方，较远
      BoxRect::new(600.0, 400.0, 40.0, 20.0), // 不在任何躯干区域
    ];
    let links = predict_link_indices(&bibs, &faces);
    assert_eq!(links, vec![Link::new(0, 1), Link::new(1, 0)]);
  }

  #[test]
  fn a_bib_is_claimed_by_the_closer_face_only() {
    // 两张脸的躯干区域重叠，号码布更靠近第二张脸
    let faces = [BoxRect::new(100.0, 50.0, 40.0, 40.0), BoxRect::new(140.0, 60.0, 40.0, 40.0)];
    let bibs = [BoxRect::new(140.0, 110.0, 30.0, 20.0)];
    let links = predict_links(&bibs, &faces);
    assert_eq!(links.len(), 1);
    assert_eq!(*links[0].1, faces[1]);
  }

  #[test]
  fn no_faces_means_no_links() {
    let bibs = [BoxRect::new(0.0, 0.0, 1.0, 1.0)];
    let faces: [BoxRect; 0] = [];
    assert!(predict_link_indices(&bibs, &faces).is_empty());
  }

  #[test]
  fn link_serializes_as_pair() {
    let json = serde_json::to_string(&Link::new(2, 5)).unwrap();
    assert_eq!(json, "[2,5]");
    let back: Link = serde_json::from_str("[1,0]").unwrap();
    assert_eq!(back, Link::new(1, 0));
  }
}
