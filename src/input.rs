// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/input.rs - 张量回放输入
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

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::engine::{CameraPose, Engine, OutputHead};
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum ReplayInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("回放文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("回放文件解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("回放文件为空")]
  NoFrames,
}

/// 回放文件中一个输出头的张量数据。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayHead {
  pub nx: usize,
  pub ny: usize,
  pub data: Vec<f32>,
}

/// 回放文件中的一帧：时间戳加该帧的全部输出张量。
///
/// 作为 `Engine::Frame` 使用时调度器不解释其内容，宿主在推理完成后
/// 用 `heads_view` 把张量借给后处理。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayFrame {
  pub timestamp: f64,
  pub heads: Vec<ReplayHead>,
}

impl ReplayFrame {
  /// 本帧张量的只读视图。
  pub fn heads_view(&self) -> Vec<OutputHead<'_>> {
    self
      .heads
      .iter()
      .map(|h| OutputHead {
        data: &h.data,
        nx: h.nx,
        ny: h.ny,
      })
      .collect()
  }

  /// 各头的空间形状，供绑定期构建网格表。
  pub fn shapes(&self) -> Vec<(usize, usize)> {
    self.heads.iter().map(|h| (h.nx, h.ny)).collect()
  }
}

#[derive(Debug, Deserialize)]
struct ReplayFile {
  frames: Vec<ReplayFrame>,
}

/// 从 JSON 转储回放张量序列的输入源，代替真实的采集与推理链路，
/// 用于命令行工具和离线调试。
pub struct ReplayInput {
  frames: VecDeque<ReplayFrame>,
}

impl ReplayInput {
  pub fn from_path(path: &str) -> Result<Self, ReplayInputError> {
    info!("加载回放文件: {}", path);
    let text = std::fs::read_to_string(path)?;
    let file: ReplayFile = serde_json::from_str(&text)?;
    if file.frames.is_empty() {
      return Err(ReplayInputError::NoFrames);
    }
    debug!("回放文件包含 {} 帧", file.frames.len());
    Ok(Self {
      frames: file.frames.into(),
    })
  }

  /// 第一帧的输出形状，用于模型绑定。
  pub fn shapes(&self) -> Vec<(usize, usize)> {
    self.frames.front().map(|f| f.shapes()).unwrap_or_default()
  }
}

impl FromUrlWithScheme for ReplayInput {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayInput {
  type Error = ReplayInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayInputError::SchemeMismatch);
    }
    Self::from_path(url.path())
  }
}

impl Iterator for ReplayInput {
  type Item = ReplayFrame;

  fn next(&mut self) -> Option<ReplayFrame> {
    self.frames.pop_front()
  }
}

/// 回放模式下的引擎替身：推理早已离线完成，提交只做记录。
#[derive(Debug, Default)]
pub struct ReplayEngine {
  submitted: u64,
}

impl ReplayEngine {
  pub fn submitted(&self) -> u64 {
    self.submitted
  }
}

impl Engine for ReplayEngine {
  type Frame = ReplayFrame;
  type Error = std::convert::Infallible;

  fn submit(&mut self, frame: &ReplayFrame, _pose: &CameraPose) -> Result<(), Self::Error> {
    self.submitted += 1;
    debug!(
      "回放推理 {} 已提交, 时间戳 {:.3}, {} 个输出头",
      self.submitted,
      frame.timestamp,
      frame.heads.len()
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_replay_file_parse() {
    let text = r#"{
      "frames": [
        { "timestamp": 0.033, "heads": [ { "nx": 2, "ny": 2, "data": [0.0, 1.0] } ] },
        { "timestamp": 0.066, "heads": [ { "nx": 2, "ny": 2, "data": [0.5] } ] }
      ]
    }"#;
    let file: ReplayFile = serde_json::from_str(text).unwrap();
    assert_eq!(file.frames.len(), 2);
    assert_eq!(file.frames[0].shapes(), vec![(2, 2)]);

    let views = file.frames[0].heads_view();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].data, &[0.0, 1.0]);
  }

  #[test]
  fn test_empty_replay_is_fatal() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("chepai-replay-empty-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "frames": [] }"#).unwrap();
    let result = ReplayInput::from_path(path.to_str().unwrap());
    assert!(matches!(result, Err(ReplayInputError::NoFrames)));
    std::fs::remove_file(&path).unwrap();
  }

  #[test]
  fn test_replay_iterates_in_order() {
    let frames = vec![
      ReplayFrame {
        timestamp: 0.1,
        heads: Vec::new(),
      },
      ReplayFrame {
        timestamp: 0.2,
        heads: Vec::new(),
      },
    ];
    let mut input = ReplayInput {
      frames: frames.into(),
    };
    assert_eq!(input.next().unwrap().timestamp, 0.1);
    assert_eq!(input.next().unwrap().timestamp, 0.2);
    assert!(input.next().is_none());
  }
}
