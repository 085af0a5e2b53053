// 该文件是 Bibscan （号码布识别） 项目的一部分。
// tests/benchmark.rs - 对照标注评测的端到端测试
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

mod common;

use bibscan::{
  BibDetector, EvaluationConfig,
  evaluate::MatchResult,
  ground_truth::GroundTruthSet,
  task::{BenchmarkTask, Task},
};
use common::*;

/// 号码布框为场景中亮色区域的归一化坐标
const LABELS: &str = r#"{
  "photos": {
    "race1": {
      "image": "race1.png",
      "bibs": [
        {"x": 0.3125, "y": 0.3125, "w": 0.375, "h": 0.3125, "number": "42"},
        {"x": 0.9, "y": 0.9, "w": 0.05, "h": 0.05, "number": "3", "scope": "not_bib"}
      ],
      "faces": [
        {"x": 0.45, "y": 0.05, "w": 0.1, "h": 0.15},
        {"x": 0.05, "y": 0.05, "w": 0.1, "h": 0.15, "scope": "exclude"}
      ],
      "links": [[0, 0]]
    },
    "missing": {"image": "nope.png"}
  }
}"#;

fn task(images: &std::path::Path) -> BenchmarkTask {
  BenchmarkTask::new(
    BibDetector::new(config_with_width(None)).unwrap(),
    EvaluationConfig::default(),
    images,
  )
  .unwrap()
}

#[test]
fn photo_scores_boxes_numbers_and_links() {
  let truth = GroundTruthSet::from_json_str(LABELS).unwrap();
  let labels = truth.get("race1").unwrap();
  let service = BrightTextService::new("42", 0.8, SCENE_SIZE.0);

  let report = task(std::path::Path::new("."))
    .evaluate_photo("race1", labels, &scene(), &service)
    .unwrap();

  assert_eq!(report.detected, vec!["42".to_string()]);
  assert_eq!(report.expected, vec!["42".to_string()]);
  assert_eq!(report.bib_boxes, MatchResult::new(1, 0, 0));
  assert_eq!(report.bib_numbers, MatchResult::new(1, 0, 0));
  assert_eq!(report.links.result, MatchResult::new(1, 0, 0));
  assert_eq!(report.links.ground_truth_link_count, 1);
}

#[test]
fn wrong_number_in_the_right_place_still_matches_the_box() {
  let truth = GroundTruthSet::from_json_str(LABELS).unwrap();
  let labels = truth.get("race1").unwrap();
  let service = BrightTextService::new("43", 0.8, SCENE_SIZE.0);

  let report = task(std::path::Path::new("."))
    .evaluate_photo("race1", labels, &scene(), &service)
    .unwrap();

  assert_eq!(report.bib_boxes, MatchResult::new(1, 0, 0));
  assert_eq!(report.bib_numbers, MatchResult::new(0, 1, 1));
}

#[test]
fn missing_image_is_reported_without_stopping_the_run() {
  let dir = tempfile::tempdir().unwrap();
  scene().save(dir.path().join("race1.png")).unwrap();

  let truth = GroundTruthSet::from_json_str(LABELS).unwrap();
  let service = BrightTextService::new("42", 0.8, SCENE_SIZE.0);
  let mut buffer = Vec::new();
  task(dir.path()).run_task(&truth, &service, &mut buffer).unwrap();

  let report: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
  assert_eq!(report["photo_count"], 2);
  assert_eq!(report["evaluated_count"], 1);
  assert_eq!(report["failed_photos"][0]["photo"], "missing");
  assert_eq!(report["bib_numbers"]["true_positives"], 1);
  assert_eq!(report["bib_numbers"]["precision"], 1.0);
  assert_eq!(report["links"]["ground_truth_link_count"], 1);
  assert!(report["generated_at"].as_str().is_some());
}
