// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/output.rs - 检测结果输出
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
use std::sync::Mutex;

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::detector::DetectResult;
use crate::{FromUrl, FromUrlWithScheme};

/// 显示层接口：每次推理完成后收到一份按得分降序的检测列表。
pub trait Render {
  type Error: std::error::Error + Sync + Send + 'static;
  fn render_result(&self, result: &DetectResult) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("记录输出错误: {0}")]
  RecordOutputError(#[from] RecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 日志输出：把每个检测打到 tracing，主要用于调试与回放。
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOutput;

const LOG_SCHEME: &str = "log";

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = LOG_SCHEME;
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != LOG_SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(LogOutput)
  }
}

impl Render for LogOutput {
  type Error = std::convert::Infallible;

  fn render_result(&self, result: &DetectResult) -> Result<(), Self::Error> {
    for (idx, det) in result.items.iter().enumerate() {
      info!(
        "检测 {}: {} ({}) 得分 {:.3} 框 [{:.3}, {:.3}, {:.3}, {:.3}]",
        idx,
        det.label,
        det.class_id,
        det.score,
        det.bbox[0],
        det.bbox[1],
        det.bbox[2],
        det.bbox[3]
      );
    }
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum RecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 目录记录输出：每次推理的检测列表序列化为一个 JSON 文件。
///
/// 默认只记录非空结果，URI 带 `?always` 时空结果也落盘。
pub struct RecordOutput {
  directory: PathBuf,
  frame_counter: Mutex<u64>,
  always: bool,
}

impl RecordOutput {
  pub fn new<P: Into<PathBuf>>(directory: P, always: bool) -> Result<Self, RecordOutputError> {
    let directory = directory.into();
    std::fs::create_dir_all(&directory)?;
    Ok(Self {
      directory,
      frame_counter: Mutex::new(0),
      always,
    })
  }
}

impl FromUrlWithScheme for RecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for RecordOutput {
  type Error = RecordOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RecordOutputError::SchemeMismatch);
    }
    let always = url.query_pairs().any(|(k, _)| k == "always");
    Self::new(url.path(), always)
  }
}

impl Render for RecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, result: &DetectResult) -> Result<(), Self::Error> {
    if result.is_empty() && !self.always {
      return Ok(());
    }

    let index = {
      let mut counter = self
        .frame_counter
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
      *counter += 1;
      *counter
    };

    let name = format!("{}-{:06}.json", Utc::now().format("%Y%m%dT%H%M%S%3f"), index);
    let path = self.directory.join(name);
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, result)?;
    Ok(())
  }
}

/// 按 URI 方案选择输出实现。
pub enum OutputWrapper {
  LogOutput(LogOutput),
  RecordOutput(RecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::LogOutput(LogOutput::from_url(url)?)),
      RecordOutput::SCHEME => {
        let output = RecordOutput::from_url(url).map_err(OutputError::from)?;
        Ok(OutputWrapper::RecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::LogOutput(output) => output.render_result(result).map_err(|e| match e {}),
      OutputWrapper::RecordOutput(output) => {
        output.render_result(result).map_err(OutputError::from)
      }
    }
  }
}
