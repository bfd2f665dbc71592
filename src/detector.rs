// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/detector.rs - 检测核心：解码、抑制与标签解析
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

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::class::ClassTable;
use crate::config::{ConfigError, PipelineConfig};
use crate::engine::OutputHead;
use crate::grid::Grid;

pub mod decode;
pub mod nms;

/// 一次解码过程中的候选框。
///
/// `bbox` 为中心-宽高形式，相对模型输入尺寸归一化到 `[0,1]`；
/// `score` 为目标置信度与最佳启用类别概率的乘积。
#[derive(Debug, Clone)]
pub struct Candidate {
  pub bbox: [f32; 4], // [cx, cy, w, h]
  pub class_id: usize,
  pub score: f32,
}

/// 幸存抑制后的检测结果，附带解析后的标签。
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
  pub bbox: [f32; 4], // [cx, cy, w, h]
  pub class_id: usize,
  pub label: String,
  pub score: f32,
}

/// 一次完整推理过程的输出，按得分降序。
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// 检测核心：持有配置、类别表和各头网格表，对一组输出张量执行
/// 解码 → NMS → 标签解析。
pub struct Detector {
  config: PipelineConfig,
  classes: ClassTable,
  grids: Vec<Grid>,
}

impl Detector {
  pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    let classes = config.class_table();
    Ok(Self {
      config,
      classes,
      grids: Vec::new(),
    })
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn classes(&self) -> &ClassTable {
    &self.classes
  }

  /// 配置阶段使用，不得与解码过程交错。
  pub fn classes_mut(&mut self) -> &mut ClassTable {
    &mut self.classes
  }

  /// 模型输出形状确定后调用一次，为每个头构建网格表。
  ///
  /// 形状与配置预期不符只记录诊断日志，不视为错误；解码按实际
  /// 上报的形状进行。
  pub fn bind_heads(&mut self, shapes: &[(usize, usize)]) {
    if shapes.len() != self.config.heads.len() {
      warn!(
        "检测头数量与配置不符: 上报 {}, 配置 {}",
        shapes.len(),
        self.config.heads.len()
      );
    }

    self.grids.clear();
    for (idx, &(nx, ny)) in shapes.iter().enumerate() {
      if let Some(head_cfg) = self.config.heads.get(idx) {
        let expected = self.config.input_width / head_cfg.stride;
        if (nx as f32 - expected).abs() > f32::EPSILON {
          warn!(
            "检测头 {} 空间尺寸 {}x{} 与步长 {} 推算的 {} 不符",
            idx, nx, ny, head_cfg.stride, expected
          );
        }
      }
      debug!("检测头 {} 形状: {}x{}", idx, nx, ny);
      self.grids.push(Grid::build(nx, ny));
    }

    info!(
      "网格表构建完成: {} 个检测头, {} 类, 置信度阈值 {}, IOU 阈值 {}",
      self.grids.len(),
      self.config.num_classes,
      self.config.score_threshold,
      self.config.iou_threshold
    );
    debug!(
      "启用类别: {:?}",
      self.classes.enabled_ids().collect::<Vec<_>>()
    );
  }

  pub fn is_bound(&self) -> bool {
    !self.grids.is_empty()
  }

  /// 对一组输出张量执行一次完整的后处理。
  ///
  /// 候选累加器按次新建；上一次调用的任何状态不会泄漏到本次。
  pub fn process(&mut self, heads: &[OutputHead]) -> DetectResult {
    if heads.len() != self.grids.len() {
      warn!(
        "输出头数量与网格表不符: 上报 {}, 已绑定 {}",
        heads.len(),
        self.grids.len()
      );
    }

    let mut candidates = Vec::new();
    for (idx, head) in heads.iter().enumerate() {
      let Some(head_cfg) = self.config.heads.get(idx) else {
        warn!("检测头 {} 超出配置范围，跳过", idx);
        continue;
      };
      let Some(grid) = self.grids.get_mut(idx) else {
        warn!("检测头 {} 未绑定网格表，跳过", idx);
        continue;
      };

      // 形状变化意味着模型被重载，重建该头的网格表
      if !grid.matches(head.nx, head.ny) {
        warn!(
          "检测头 {} 形状由 {}x{} 变为 {}x{}, 重建网格表",
          idx,
          grid.nx(),
          grid.ny(),
          head.nx,
          head.ny
        );
        *grid = Grid::build(head.nx, head.ny);
      }

      decode::decode_head(
        head,
        grid,
        head_cfg,
        &self.classes,
        self.config.num_classes,
        (self.config.input_width, self.config.input_height),
        self.config.score_threshold,
        self.config.norm_policy,
        &mut candidates,
      );
    }

    debug!("解码得到 {} 个候选框", candidates.len());

    let survivors = nms::suppress(
      &candidates,
      self.config.score_threshold,
      self.config.iou_threshold,
      self.config.nms_policy,
    );

    debug!("NMS 后剩余 {} 个检测", survivors.len());

    let items = survivors
      .into_iter()
      .map(|c| Detection {
        bbox: c.bbox,
        label: self.classes.label_of(c.class_id),
        class_id: c.class_id,
        score: c.score,
      })
      .collect::<Vec<_>>();

    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}
