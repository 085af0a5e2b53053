// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/bin/detect.rs - 批量识别照片中的号码
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use bibscan::{
  BibDetector, FromUrl, PipelineConfig,
  input::InputWrapper,
  output::OutputWrapper,
  task::{DetectTask, Task},
  text_service::ExecTextService,
};
use tracing::info;

/// Bibscan 号码识别参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源，如 image:///data/race/ 或 image:///data/race/IMG_0001.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 文字识别引擎，如 exec:///usr/local/bin/bib-ocr?arg=--lang&arg=en
  #[arg(long, value_name = "ENGINE")]
  pub engine: Url,
  /// 输出路径，如 folder:///out/records?draw 或 image:///out/overlays
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// JSON 配置文件，未给出的字段使用默认值
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 归一化宽度，覆盖配置文件
  #[arg(long, value_name = "PIXELS")]
  pub target_width: Option<u32>,
  /// 关闭对比度增强
  #[arg(long)]
  pub no_contrast: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("识别引擎: {}", args.engine);
  info!("输出路径: {}", args.output);

  let mut config = match &args.config {
    Some(path) => PipelineConfig::from_json_file(path)?,
    None => PipelineConfig::default(),
  };
  if let Some(width) = args.target_width {
    config.preprocess.target_width = Some(width);
  }
  if args.no_contrast {
    config.preprocess.contrast_enabled = false;
  }

  let detector = BibDetector::new(config)?;
  let input = InputWrapper::from_url(&args.input)?;
  let service = ExecTextService::from_url(&args.engine)?;
  let output = OutputWrapper::from_url(&args.output)?;

  DetectTask::new(detector).run_task(input, service, output)
}
