// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/class.rs - 类别过滤表
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

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 单个类别条目：标签与是否参与解码。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntry {
  pub label: String,
  pub enabled: bool,
}

/// 类别过滤表。
///
/// 启动时构建一次的定长数组，按类别索引查询。`set_enabled` 只允许在
/// 配置阶段调用，不得与解码过程交错（单线程协作模型由调用方保证）。
#[derive(Debug, Clone)]
pub struct ClassTable {
  entries: Box<[ClassEntry]>,
}

impl ClassTable {
  /// 从条目列表构建。
  pub fn new(entries: Vec<ClassEntry>) -> Self {
    Self {
      entries: entries.into_boxed_slice(),
    }
  }

  /// COCO 80 类标签表，仅启用 `enabled_ids` 中的类别。
  pub fn coco(enabled_ids: &[usize]) -> Self {
    let entries = COCO_CLASSES
      .iter()
      .enumerate()
      .map(|(id, label)| ClassEntry {
        label: label.to_string(),
        enabled: enabled_ids.contains(&id),
      })
      .collect::<Vec<_>>();
    Self::new(entries)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// 类别标签；越界时返回合成占位标签，保证显示层总是有名字可用。
  pub fn label_of(&self, class_id: usize) -> String {
    match self.entries.get(class_id) {
      Some(entry) if !entry.label.is_empty() => entry.label.clone(),
      _ => format!("class_{}", class_id),
    }
  }

  /// 类别是否参与解码；越界视为未启用。
  pub fn is_enabled(&self, class_id: usize) -> bool {
    self.entries.get(class_id).map(|e| e.enabled).unwrap_or(false)
  }

  /// 配置阶段开关类别，越界忽略。
  pub fn set_enabled(&mut self, class_id: usize, enabled: bool) {
    if let Some(entry) = self.entries.get_mut(class_id) {
      entry.enabled = enabled;
    }
  }

  /// 已启用类别的迭代器，便于绑定期日志。
  pub fn enabled_ids(&self) -> impl Iterator<Item = usize> + '_ {
    self
      .entries
      .iter()
      .enumerate()
      .filter(|(_, e)| e.enabled)
      .map(|(id, _)| id)
  }
}
