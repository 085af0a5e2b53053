// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/bin/bench.rs - 对照人工标注评测识别质量
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

use std::{fs::File, io::BufWriter, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use bibscan::{
  BibDetector, EvaluationConfig, FromUrl, PipelineConfig,
  ground_truth::GroundTruthSet,
  task::{BenchmarkTask, Task},
  text_service::ExecTextService,
};
use tracing::info;

/// Bibscan 评测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 标注文件 (JSON)
  #[arg(long, value_name = "FILE")]
  pub truth: PathBuf,
  /// 图像目录，标注中的图像路径相对于该目录
  #[arg(long, value_name = "DIR")]
  pub images: PathBuf,
  /// 文字识别引擎，如 exec:///usr/local/bin/bib-ocr
  #[arg(long, value_name = "ENGINE")]
  pub engine: Url,
  /// JSON 配置文件，未给出的字段使用默认值
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 匹配所需的 IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub iou: f32,
  /// 报告输出文件，缺省写到标准输出
  #[arg(long, value_name = "FILE")]
  pub report: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("标注文件: {}", args.truth.display());
  info!("图像目录: {}", args.images.display());
  info!("识别引擎: {}", args.engine);

  let config = match &args.config {
    Some(path) => PipelineConfig::from_json_file(path)?,
    None => PipelineConfig::default(),
  };
  let truth = GroundTruthSet::from_json_file(&args.truth)
    .with_context(|| format!("无法加载标注文件 {}", args.truth.display()))?;
  let service = ExecTextService::from_url(&args.engine)?;
  let task = BenchmarkTask::new(
    BibDetector::new(config)?,
    EvaluationConfig {
      iou_threshold: args.iou,
    },
    &args.images,
  )?;

  match &args.report {
    Some(path) => {
      let file =
        File::create(path).with_context(|| format!("无法创建报告文件 {}", path.display()))?;
      task.run_task(&truth, service, BufWriter::new(file))?;
      info!("评测报告已写入 {}", path.display());
    }
    None => task.run_task(&truth, service, std::io::stdout().lock())?,
  }

  Ok(())
}
