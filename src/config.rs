// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/config.rs - 管线配置
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
use thiserror::Error;
use tracing::info;

use crate::class::{ClassEntry, ClassTable};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("阈值 {0} 超出 [0,1] 范围: {1}")]
  ThresholdOutOfRange(&'static str, f32),
  #[error("至少需要一个检测头")]
  NoHeads,
  #[error("检测头 {0} 未配置锚框")]
  EmptyAnchors(usize),
  #[error("检测头 {0} 的步长必须为正数: {1}")]
  InvalidStride(usize, f32),
  #[error("模型输入尺寸必须为正数: {0}x{1}")]
  InvalidInputSize(f32, f32),
}

/// 单个检测头的静态配置：锚框模板（像素尺度）与步长。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadConfig {
  /// 锚框 `(宽, 高)` 列表，YOLOv7 配置下每头 3 个
  pub anchors: Vec<(f32, f32)>,
  /// 固定步长，输入尺寸 / 该头空间尺寸
  pub stride: f32,
}

/// NMS 合并策略。默认跨类别合并，按类别合并作为可配置变体保留。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NmsPolicy {
  #[default]
  ClassAgnostic,
  PerClass,
}

/// 框宽度归一化策略。
///
/// `Legacy` 把宽与高都除以输入高度，疑似缺陷但保留为默认，
/// 不做静默修正；`Corrected` 按各自轴归一化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NormPolicy {
  #[default]
  Legacy,
  Corrected,
}

/// 检测管线配置，启动时加载一次，稳态运行期间视为不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
  /// 模型输入宽度（像素）
  pub input_width: f32,
  /// 模型输入高度（像素）
  pub input_height: f32,
  /// 类别数量
  pub num_classes: usize,
  /// 各检测头的锚框与步长
  pub heads: Vec<HeadConfig>,
  /// 置信度阈值 (0.0 - 1.0)
  pub score_threshold: f32,
  /// NMS IOU 阈值 (0.0 - 1.0)
  pub iou_threshold: f32,
  #[serde(default)]
  pub nms_policy: NmsPolicy,
  #[serde(default)]
  pub norm_policy: NormPolicy,
  /// 帧间隔：两次推理之间跳过的帧数，0 表示每帧都可触发
  #[serde(default)]
  pub frame_skip: u32,
  /// 参与解码的类别索引，标签表为 COCO 时的默认启用集
  #[serde(default)]
  pub enabled_classes: Vec<usize>,
  /// 自定义类别表；为空时使用 COCO 80 类加 `enabled_classes`
  #[serde(default)]
  pub classes: Vec<ClassEntry>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    // YOLOv7-tiny COCO 配置
    Self {
      input_width: 640.0,
      input_height: 640.0,
      num_classes: 80,
      heads: vec![
        HeadConfig {
          anchors: vec![(19.0, 27.0), (44.0, 40.0), (38.0, 94.0)],
          stride: 8.0,
        },
        HeadConfig {
          anchors: vec![(96.0, 68.0), (86.0, 152.0), (180.0, 137.0)],
          stride: 16.0,
        },
        HeadConfig {
          anchors: vec![(140.0, 301.0), (303.0, 264.0), (238.0, 542.0)],
          stride: 32.0,
        },
      ],
      score_threshold: 0.1,
      iou_threshold: 0.5,
      nms_policy: NmsPolicy::default(),
      norm_policy: NormPolicy::default(),
      frame_skip: 0,
      enabled_classes: vec![2, 5, 7], // car, bus, truck
      classes: Vec::new(),
    }
  }
}

impl PipelineConfig {
  /// 从 JSON 文件加载并校验。配置损坏对初始化是致命的，只报告一次。
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    info!("加载配置文件: {}", path.as_ref().display());
    let text = std::fs::read_to_string(path)?;
    let config: PipelineConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
  }

  /// 校验阈值范围与检测头配置。
  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.score_threshold) {
      return Err(ConfigError::ThresholdOutOfRange(
        "score_threshold",
        self.score_threshold,
      ));
    }
    if !(0.0..=1.0).contains(&self.iou_threshold) {
      return Err(ConfigError::ThresholdOutOfRange(
        "iou_threshold",
        self.iou_threshold,
      ));
    }
    if self.heads.is_empty() {
      return Err(ConfigError::NoHeads);
    }
    for (idx, head) in self.heads.iter().enumerate() {
      if head.anchors.is_empty() {
        return Err(ConfigError::EmptyAnchors(idx));
      }
      if head.stride <= 0.0 {
        return Err(ConfigError::InvalidStride(idx, head.stride));
      }
    }
    if self.input_width <= 0.0 || self.input_height <= 0.0 {
      return Err(ConfigError::InvalidInputSize(
        self.input_width,
        self.input_height,
      ));
    }
    Ok(())
  }

  /// 构建类别过滤表。
  pub fn class_table(&self) -> ClassTable {
    if self.classes.is_empty() {
      ClassTable::coco(&self.enabled_classes)
    } else {
      ClassTable::new(self.classes.clone())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config_is_valid() {
    let config = PipelineConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.heads.len(), 3);
    assert_eq!(config.heads[0].anchors.len(), 3);
    assert_eq!(config.nms_policy, NmsPolicy::ClassAgnostic);
    assert_eq!(config.norm_policy, NormPolicy::Legacy);
  }

  #[test]
  fn test_threshold_out_of_range() {
    let mut config = PipelineConfig::default();
    config.score_threshold = 1.5;
    assert!(matches!(
      config.validate(),
      Err(ConfigError::ThresholdOutOfRange("score_threshold", _))
    ));

    let mut config = PipelineConfig::default();
    config.iou_threshold = -0.1;
    assert!(matches!(
      config.validate(),
      Err(ConfigError::ThresholdOutOfRange("iou_threshold", _))
    ));
  }

  #[test]
  fn test_heads_must_be_sane() {
    let mut config = PipelineConfig::default();
    config.heads.clear();
    assert!(matches!(config.validate(), Err(ConfigError::NoHeads)));

    let mut config = PipelineConfig::default();
    config.heads[1].anchors.clear();
    assert!(matches!(
      config.validate(),
      Err(ConfigError::EmptyAnchors(1))
    ));

    let mut config = PipelineConfig::default();
    config.heads[2].stride = 0.0;
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidStride(2, _))
    ));
  }

  #[test]
  fn test_json_round() {
    let config = PipelineConfig::default();
    let text = serde_json::to_string(&config).unwrap();
    let parsed: PipelineConfig = serde_json::from_str(&text).unwrap();
    assert!(parsed.validate().is_ok());
    assert_eq!(parsed.enabled_classes, vec![2, 5, 7]);
    assert_eq!(parsed.heads[2].stride, 32.0);
  }

  #[test]
  fn test_class_table_from_config() {
    let config = PipelineConfig::default();
    let table = config.class_table();
    assert!(table.is_enabled(2));
    assert!(!table.is_enabled(3));

    let mut config = PipelineConfig::default();
    config.classes = vec![
      ClassEntry {
        label: "plate".to_string(),
        enabled: true,
      },
      ClassEntry {
        label: "background".to_string(),
        enabled: false,
      },
    ];
    let table = config.class_table();
    assert_eq!(table.len(), 2);
    assert_eq!(table.label_of(0), "plate");
    assert!(!table.is_enabled(1));
  }
}
