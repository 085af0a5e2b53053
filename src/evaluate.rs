// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/evaluate.rs - 基于 IoU 的匹配与评分
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

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{geometry::AsBoxRect, link::Link};

/// 单张照片的匹配计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
  pub true_positives: usize,
  pub false_positives: usize,
  pub false_negatives: usize,
}

impl MatchResult {
  pub fn new(true_positives: usize, false_positives: usize, false_negatives: usize) -> Self {
    Self {
      true_positives,
      false_positives,
      false_negatives,
    }
  }
}

/// 按 IoU 降序贪心配对，返回 (预测下标, 真值下标)
///
/// IoU 相同时按预测下标、再按真值下标排序，保证结果确定。
pub fn match_pairs<P: AsBoxRect, G: AsBoxRect>(
  predicted: &[P],
  ground_truth: &[G],
  iou_threshold: f32,
) -> Vec<(usize, usize)> {
  let gt_rects: Vec<_> = ground_truth.iter().map(AsBoxRect::box_rect).collect();
  let mut scored = Vec::new();
  for (p, pred) in predicted.iter().enumerate() {
    let rect = pred.box_rect();
    for (g, gt) in gt_rects.iter().enumerate() {
      let iou = rect.iou(gt);
      if iou >= iou_threshold {
        scored.push((iou, p, g));
      }
    }
  }
  greedy_assign(scored, predicted.len(), ground_truth.len())
}

fn greedy_assign(
  mut scored: Vec<(f32, usize, usize)>,
  predicted: usize,
  ground_truth: usize,
) -> Vec<(usize, usize)> {
  scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

  let mut pred_used = vec![false; predicted];
  let mut gt_used = vec![false; ground_truth];
  let mut pairs = Vec::new();
  for (_, p, g) in scored {
    if pred_used[p] || gt_used[g] {
      continue;
    }
    pred_used[p] = true;
    gt_used[g] = true;
    pairs.push((p, g));
  }
  pairs
}

/// 预测框与真值框的贪心 IoU 匹配
pub fn match_boxes<P: AsBoxRect, G: AsBoxRect>(
  predicted: &[P],
  ground_truth: &[G],
  iou_threshold: f32,
) -> MatchResult {
  let matched = match_pairs(predicted, ground_truth, iou_threshold).len();
  MatchResult::new(
    matched,
    predicted.len() - matched,
    ground_truth.len() - matched,
  )
}

/// 号码集合比较，每个不同号码只计一次
pub fn score_bib_numbers<'a>(
  predicted: impl IntoIterator<Item = &'a str>,
  ground_truth: impl IntoIterator<Item = &'a str>,
) -> MatchResult {
  let predicted: BTreeSet<&str> = predicted.into_iter().collect();
  let ground_truth: BTreeSet<&str> = ground_truth.into_iter().collect();
  let matched = predicted.intersection(&ground_truth).count();
  MatchResult::new(
    matched,
    predicted.len() - matched,
    ground_truth.len() - matched,
  )
}

/// 号码布-人脸关联的匹配计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkMatchResult {
  #[serde(flatten)]
  pub result: MatchResult,
  pub ground_truth_link_count: usize,
}

/// 关联评分：预测的 (号码布框, 人脸框) 只有同时与某条真值关联的
/// 号码布框和人脸框达到 IoU 阈值时才算正确
pub fn score_links<B, F, GB, GF>(
  predicted: &[(B, F)],
  gt_bibs: &[GB],
  gt_faces: &[GF],
  gt_links: &[Link],
  iou_threshold: f32,
) -> LinkMatchResult
where
  B: AsBoxRect,
  F: AsBoxRect,
  GB: AsBoxRect,
  GF: AsBoxRect,
{
  let mut scored = Vec::new();
  for (p, (bib, face)) in predicted.iter().enumerate() {
    let (bib, face) = (bib.box_rect(), face.box_rect());
    for (l, link) in gt_links.iter().enumerate() {
      let (Some(gt_bib), Some(gt_face)) = (gt_bibs.get(link.bib), gt_faces.get(link.face)) else {
        continue;
      };
      let bib_iou = bib.iou(&gt_bib.box_rect());
      let face_iou = face.iou(&gt_face.box_rect());
      if bib_iou >= iou_threshold && face_iou >= iou_threshold {
        scored.push((bib_iou.min(face_iou), p, l));
      }
    }
  }

  let matched = greedy_assign(scored, predicted.len(), gt_links.len()).len();
  LinkMatchResult {
    result: MatchResult::new(
      matched,
      predicted.len() - matched,
      gt_links.len() - matched,
    ),
    ground_truth_link_count: gt_links.len(),
  }
}

/// 多张照片的累计评分
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scorecard {
  pub true_positives: usize,
  pub false_positives: usize,
  pub false_negatives: usize,
}

/// 评分报告，包含派生指标
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScorecardReport {
  pub true_positives: usize,
  pub false_positives: usize,
  pub false_negatives: usize,
  pub precision: f64,
  pub recall: f64,
  pub f1: f64,
}

impl Scorecard {
  pub fn add(&mut self, result: &MatchResult) {
    self.true_positives += result.true_positives;
    self.false_positives += result.false_positives;
    self.false_negatives += result.false_negatives;
  }

  pub fn precision(&self) -> f64 {
    ratio(self.true_positives, self.true_positives + self.false_positives)
  }

  pub fn recall(&self) -> f64 {
    ratio(self.true_positives, self.true_positives + self.false_negatives)
  }

  pub fn f1(&self) -> f64 {
    let (p, r) = (self.precision(), self.recall());
    if p + r > 0.0 {
      2.0 * p * r / (p + r)
    } else {
      0.0
    }
  }

  pub fn report(&self) -> ScorecardReport {
    ScorecardReport {
      true_positives: self.true_positives,
      false_positives: self.false_positives,
      false_negatives: self.false_negatives,
      precision: self.precision(),
      recall: self.recall(),
      f1: self.f1(),
    }
  }
}

impl<'a> FromIterator<&'a MatchResult> for Scorecard {
  fn from_iter<T: IntoIterator<Item = &'a MatchResult>>(iter: T) -> Self {
    let mut card = Scorecard::default();
    for result in iter {
      card.add(result);
    }
    card
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkScorecard {
  pub scorecard: Scorecard,
  pub ground_truth_link_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkScorecardReport {
  #[serde(flatten)]
  pub scorecard: ScorecardReport,
  pub ground_truth_link_count: usize,
}

impl LinkScorecard {
  pub fn add(&mut self, result: &LinkMatchResult) {
    self.scorecard.add(&result.result);
    self.ground_truth_link_count += result.ground_truth_link_count;
  }

  pub fn report(&self) -> LinkScorecardReport {
    LinkScorecardReport {
      scorecard: self.scorecard.report(),
      ground_truth_link_count: self.ground_truth_link_count,
    }
  }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
  if denominator == 0 {
    0.0
  } else {
    numerator as f64 / denominator as f64
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::BoxRect;

  fn b(x: f32, y: f32, w: f32, h: f32) -> BoxRect {
    BoxRect::new(x, y, w, h)
  }

  /// 与 `base` 同高、水平平移得到目标 IoU 的框
  fn shifted_for_iou(base: BoxRect, iou: f32) -> BoxRect {
    // 重叠宽度 o 满足 o / (2w - o) = iou
    let overlap = 2.0 * base.w * iou / (1.0 + iou);
    BoxRect::new(base.x + base.w - overlap, base.y, base.w, base.h)
  }

  #[test]
  fn each_box_takes_its_higher_iou_partner() {
    let a = b(0.0, 0.0, 100.0, 50.0);
    let b_box = shifted_for_iou(a, 0.6);
    // A' 与 A 的 IoU 为 0.9，B' 与 B 的 IoU 为 0.9，A 与 B' 的 IoU 为 0.6
    let a_gt = shifted_for_iou(a, 0.9);
    let b_gt = b_box;
    let b_pred = shifted_for_iou(b_gt, 0.9);
    assert!((a.iou(&a_gt) - 0.9).abs() < 1e-4);
    assert!((a.iou(&b_gt) - 0.6).abs() < 1e-4);
    assert!((b_pred.iou(&b_gt) - 0.9).abs() < 1e-4);

    let result = match_boxes(&[a, b_pred], &[a_gt, b_gt], 0.5);
    assert_eq!(result, MatchResult::new(2, 0, 0));
    assert_eq!(match_pairs(&[a, b_pred], &[a_gt, b_gt], 0.5), vec![(0, 0), (1, 1)]);
  }

  #[test]
  fn ties_are_broken_by_predicted_order() {
    let gt = [b(0.0, 0.0, 10.0, 10.0)];
    let predicted = [b(0.0, 0.0, 10.0, 10.0), b(0.0, 0.0, 10.0, 10.0)];
    assert_eq!(match_pairs(&predicted, &gt, 0.5), vec![(0, 0)]);
    assert_eq!(match_boxes(&predicted, &gt, 0.5), MatchResult::new(1, 1, 0));
  }

  #[test]
  fn empty_predictions_are_all_false_negatives() {
    let gt = [b(0.0, 0.0, 1.0, 1.0), b(2.0, 2.0, 1.0, 1.0), b(4.0, 4.0, 1.0, 1.0)];
    let none: [BoxRect; 0] = [];
    assert_eq!(match_boxes(&none, &gt, 0.5), MatchResult::new(0, 0, 3));
  }

  #[test]
  fn empty_ground_truth_makes_all_false_positives() {
    let predicted = [b(0.0, 0.0, 1.0, 1.0), b(2.0, 2.0, 1.0, 1.0)];
    let none: [BoxRect; 0] = [];
    assert_eq!(match_boxes(&predicted, &none, 0.5), MatchResult::new(0, 2, 0));
  }

  #[test]
  fn below_threshold_is_not_a_match() {
    let gt = [b(0.0, 0.0, 10.0, 10.0)];
    let predicted = [b(5.0, 0.0, 10.0, 10.0)];
    assert_eq!(match_boxes(&predicted, &gt, 0.5), MatchResult::new(0, 1, 1));
  }

  #[test]
  fn link_needs_correct_pairing_not_just_geometry() {
    let gt_bibs = [b(0.40, 0.50, 0.10, 0.05)];
    let gt_faces = [b(0.40, 0.20, 0.08, 0.10), b(0.70, 0.20, 0.08, 0.10)];
    let gt_links = [Link::new(0, 0)];

    // 号码布框与 bib0 吻合，人脸框与 face1 吻合，但真值中 bib0 关联的是 face0
    let predicted = [(gt_bibs[0], gt_faces[1])];
    let result = score_links(&predicted, &gt_bibs, &gt_faces, &gt_links, 0.5);
    assert_eq!(result.result, MatchResult::new(0, 1, 1));
    assert_eq!(result.ground_truth_link_count, 1);

    let predicted = [(gt_bibs[0], gt_faces[0])];
    let result = score_links(&predicted, &gt_bibs, &gt_faces, &gt_links, 0.5);
    assert_eq!(result.result, MatchResult::new(1, 0, 0));
  }

  #[test]
  fn one_link_cannot_satisfy_two_predictions() {
    let gt_bibs = [b(0.0, 0.5, 0.1, 0.1)];
    let gt_faces = [b(0.0, 0.2, 0.1, 0.1)];
    let gt_links = [Link::new(0, 0)];
    let predicted = [(gt_bibs[0], gt_faces[0]), (gt_bibs[0], gt_faces[0])];
    let result = score_links(&predicted, &gt_bibs, &gt_faces, &gt_links, 0.5);
    assert_eq!(result.result, MatchResult::new(1, 1, 0));
  }

  #[test]
  fn bib_numbers_are_compared_as_sets() {
    let result = score_bib_numbers(["12", "12", "7", "99"], ["12", "7", "31"]);
    assert_eq!(result, MatchResult::new(2, 1, 1));
  }

  #[test]
  fn scorecard_derives_metrics() {
    let results = [MatchResult::new(3, 1, 0), MatchResult::new(1, 0, 4)];
    let card: Scorecard = results.iter().collect();
    assert_eq!(card.true_positives, 4);
    assert!((card.precision() - 0.8).abs() < 1e-9);
    assert!((card.recall() - 0.5).abs() < 1e-9);
    assert!((card.f1() - 2.0 * 0.8 * 0.5 / 1.3).abs() < 1e-9);
  }

  #[test]
  fn empty_scorecard_metrics_default_to_zero() {
    let report = Scorecard::default().report();
    assert_eq!((report.precision, report.recall, report.f1), (0.0, 0.0, 0.0));
  }

  #[test]
  fn link_scorecard_accumulates_ground_truth_links() {
    let mut card = LinkScorecard::default();
    card.add(&LinkMatchResult {
      result: MatchResult::new(1, 0, 1),
      ground_truth_link_count: 2,
    });
    card.add(&LinkMatchResult {
      result: MatchResult::new(0, 1, 0),
      ground_truth_link_count: 0,
    });
    let report = card.report();
    assert_eq!(report.ground_truth_link_count, 2);
    assert!((report.scorecard.precision - 0.5).abs() < 1e-9);
  }
}
