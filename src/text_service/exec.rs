// 该文件是 Bibscan （号码布识别） 项目的一部分。
// src/text_service/exec.rs - 基于外部进程的文字识别服务
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
  io::{Cursor, Write},
  path::PathBuf,
  process::{Command, Stdio},
};

use image::{GrayImage, ImageFormat};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  text_service::{RawTextHit, TextService},
};

#[derive(Error, Debug)]
pub enum ExecTextServiceError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("识别进程退出异常 ({status}): {stderr}")]
  ProcessFailed { status: String, stderr: String },
  #[error("识别结果解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
}

/// 调用外部程序完成文字识别
///
/// 图像以 PNG 写入子进程标准输入，子进程在标准输出打印
/// `[{"bbox": [[x, y], ...], "text": "...", "confidence": 0.9}, ...]`。
#[derive(Debug, Clone)]
pub struct ExecTextService {
  program: PathBuf,
  args: Vec<String>,
}

impl FromUrlWithScheme for ExecTextService {
  const SCHEME: &'static str = "exec";
}

impl FromUrl for ExecTextService {
  type Error = ExecTextServiceError;

  /// `exec:///usr/local/bin/bib-ocr?arg=--lang&arg=en`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ExecTextServiceError::SchemeMismatch(url.scheme().to_string()));
    }

    let args = url
      .query_pairs()
      .filter(|(k, _)| k == "arg")
      .map(|(_, v)| v.into_owned())
      .collect();

    Ok(ExecTextService {
      program: PathBuf::from(url.path()),
      args,
    })
  }
}

impl ExecTextService {
  pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
    Self {
      program: program.into(),
      args,
    }
  }

  fn encode(image: &GrayImage) -> Result<Vec<u8>, ExecTextServiceError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
  }
}

impl TextService for ExecTextService {
  type Error = ExecTextServiceError;

  fn read_text(&self, image: &GrayImage) -> Result<Vec<RawTextHit>, Self::Error> {
    let payload = Self::encode(image)?;
    debug!(
      "调用识别进程 {} ({}x{}, {} 字节)",
      self.program.display(),
      image.width(),
      image.height(),
      payload.len()
    );

    let mut child = Command::new(&self.program)
      .args(&self.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()?;

    // 写入与读取并行，避免子进程输出过大时互相阻塞
    let mut stdin = child
      .stdin
      .take()
      .ok_or_else(|| std::io::Error::other("无法获取子进程标准输入"))?;
    let output = std::thread::scope(|scope| {
      let writer = scope.spawn(move || stdin.write_all(&payload));
      let output = child.wait_with_output();
      let written = writer
        .join()
        .unwrap_or_else(|_| Err(std::io::Error::other("写入线程异常退出")));
      output.and_then(|output| {
        if output.status.success() {
          written?;
        }
        Ok(output)
      })
    })?;

    if !output.status.success() {
      return Err(ExecTextServiceError::ProcessFailed {
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    let hits: Vec<RawTextHit> = serde_json::from_slice(&output.stdout)?;
    debug!("识别进程返回 {} 条结果", hits.len());
    Ok(hits)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_url_collects_program_and_args() {
    let url = Url::parse("exec:///usr/local/bin/bib-ocr?arg=--lang&arg=en&other=1").unwrap();
    let service = ExecTextService::from_url(&url).unwrap();
    assert_eq!(service.program, PathBuf::from("/usr/local/bin/bib-ocr"));
    assert_eq!(service.args, vec!["--lang".to_string(), "en".to_string()]);
  }

  #[test]
  fn from_url_rejects_other_schemes() {
    let url = Url::parse("image:///tmp/a.png").unwrap();
    assert!(matches!(
      ExecTextService::from_url(&url),
      Err(ExecTextServiceError::SchemeMismatch(_))
    ));
  }

  #[cfg(unix)]
  #[test]
  fn parses_hits_printed_by_the_process() {
    let script = r#"cat > /dev/null; echo '[{"bbox": [[1,2],[11,2],[11,8],[1,8]], "text": "123", "confidence": 0.9}]'"#;
    let service = ExecTextService::new("/bin/sh", vec!["-c".into(), script.into()]);
    let hits = service.read_text(&GrayImage::new(16, 16)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "123");
    assert_eq!(hits[0].bbox.0[2], [11.0, 8.0]);
  }

  #[cfg(unix)]
  #[test]
  fn non_zero_exit_is_reported() {
    let service = ExecTextService::new(
      "/bin/sh",
      vec!["-c".into(), "cat > /dev/null; echo boom >&2; exit 3".into()],
    );
    let err = service.read_text(&GrayImage::new(8, 8)).unwrap_err();
    assert!(matches!(err, ExecTextServiceError::ProcessFailed { .. }));
  }
}
