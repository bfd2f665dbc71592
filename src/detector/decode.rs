// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/detector/decode.rs - 锚框解码
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

use crate::class::ClassTable;
use crate::config::{HeadConfig, NormPolicy};
use crate::detector::Candidate;
use crate::engine::OutputHead;
use crate::grid::Grid;

/// 解码一个输出头，把超过置信度下限的候选框追加到 `out`。
///
/// 张量布局为 `[ny, nx, num_anchors, num_classes + 5]` 展平，
/// 每个切片为 `[x, y, w, h, objectness, class_0 .. class_{nc-1}]`。
/// 每个格点/锚框至多产出一个候选（最佳启用类别胜出）。
/// `out` 由调用方持有并在每次解码前清空。
#[allow(clippy::too_many_arguments)]
pub fn decode_head(
  head: &OutputHead,
  grid: &Grid,
  head_cfg: &HeadConfig,
  classes: &ClassTable,
  num_classes: usize,
  input_size: (f32, f32),
  floor: f32,
  norm: NormPolicy,
  out: &mut Vec<Candidate>,
) {
  let step = num_classes + 5;
  let num_anchors = head_cfg.anchors.len();
  let stride = head_cfg.stride;
  let (input_w, input_h) = input_size;

  for dy in 0..head.ny {
    for dx in 0..head.nx {
      for (da, &(anchor_w, anchor_h)) in head_cfg.anchors.iter().enumerate() {
        let idx = dy * head.nx * num_anchors * step + dx * num_anchors * step + da * step;
        // 形状严重不符时切片会越界，跳过而不是崩溃
        let Some(slice) = head.data.get(idx..idx + step) else {
          continue;
        };

        // 热路径：该分支每帧执行 nx*ny*num_anchors 次
        let conf = slice[4];
        if conf <= floor {
          continue;
        }

        let (cell_x, cell_y) = grid.at(dx, dy);
        let cx = (slice[0] * 2.0 - 0.5 + cell_x as f32) * stride;
        let cy = (slice[1] * 2.0 - 0.5 + cell_y as f32) * stride;
        let bw = slice[2] * slice[2] * anchor_w;
        let bh = slice[3] * slice[3] * anchor_h;

        // Legacy 策略下宽度也除以输入高度
        let bbox = match norm {
          NormPolicy::Legacy => [cx / input_w, cy / input_h, bw / input_h, bh / input_h],
          NormPolicy::Corrected => [cx / input_w, cy / input_h, bw / input_w, bh / input_h],
        };

        // 只扫描启用的类别，最佳者胜出
        let mut best_class = 0usize;
        let mut best_score = 0.0f32;
        for nc in 0..num_classes {
          if !classes.is_enabled(nc) {
            continue;
          }
          let class_score = slice[5 + nc] * conf;
          if class_score > floor && class_score > best_score {
            best_class = nc;
            best_score = class_score;
          }
        }

        if best_score > 0.0 {
          out.push(Candidate {
            bbox,
            class_id: best_class,
            score: best_score,
          });
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn head_cfg() -> HeadConfig {
    HeadConfig {
      anchors: vec![(10.0, 10.0)],
      stride: 8.0,
    }
  }

  fn one_cell_tensor(obj: f32, class_id: usize, class_score: f32) -> Vec<f32> {
    let mut data = vec![0.0f32; 85];
    data[0] = 0.5;
    data[1] = 0.5;
    data[2] = 1.0;
    data[3] = 1.0;
    data[4] = obj;
    data[5 + class_id] = class_score;
    data
  }

  #[test]
  fn test_decode_single_cell() {
    let data = one_cell_tensor(0.9, 2, 0.95);
    let head = OutputHead {
      data: &data,
      nx: 1,
      ny: 1,
    };
    let grid = Grid::build(1, 1);
    let classes = ClassTable::coco(&[2]);
    let mut out = Vec::new();

    decode_head(
      &head,
      &grid,
      &head_cfg(),
      &classes,
      80,
      (640.0, 640.0),
      0.1,
      NormPolicy::Legacy,
      &mut out,
    );

    assert_eq!(out.len(), 1);
    let c = &out[0];
    assert_eq!(c.class_id, 2);
    assert!((c.score - 0.855).abs() < 1e-6);
    // cx = (0.5*2 - 0.5 + 0) * 8 = 4
    assert!((c.bbox[0] - 4.0 / 640.0).abs() < 1e-6);
    assert!((c.bbox[1] - 4.0 / 640.0).abs() < 1e-6);
    // w = 1*1*10 = 10
    assert!((c.bbox[2] - 10.0 / 640.0).abs() < 1e-6);
    assert!((c.bbox[3] - 10.0 / 640.0).abs() < 1e-6);
  }

  #[test]
  fn test_objectness_floor_early_exit() {
    let data = one_cell_tensor(0.05, 2, 1.0);
    let head = OutputHead {
      data: &data,
      nx: 1,
      ny: 1,
    };
    let grid = Grid::build(1, 1);
    let classes = ClassTable::coco(&[2]);
    let mut out = Vec::new();

    decode_head(
      &head,
      &grid,
      &head_cfg(),
      &classes,
      80,
      (640.0, 640.0),
      0.1,
      NormPolicy::Legacy,
      &mut out,
    );
    assert!(out.is_empty());
  }

  #[test]
  fn test_disabled_class_yields_nothing() {
    // 类别 0 得分很高但未启用，不产出候选
    let data = one_cell_tensor(0.9, 0, 0.99);
    let head = OutputHead {
      data: &data,
      nx: 1,
      ny: 1,
    };
    let grid = Grid::build(1, 1);
    let classes = ClassTable::coco(&[2]);
    let mut out = Vec::new();

    decode_head(
      &head,
      &grid,
      &head_cfg(),
      &classes,
      80,
      (640.0, 640.0),
      0.1,
      NormPolicy::Legacy,
      &mut out,
    );
    assert!(out.is_empty());
  }

  #[test]
  fn test_best_enabled_class_wins() {
    let mut data = one_cell_tensor(0.9, 2, 0.6);
    data[5 + 5] = 0.8; // bus 更高
    data[5] = 0.99; // bicycle 最高但未启用
    let head = OutputHead {
      data: &data,
      nx: 1,
      ny: 1,
    };
    let grid = Grid::build(1, 1);
    let classes = ClassTable::coco(&[2, 5]);
    let mut out = Vec::new();

    decode_head(
      &head,
      &grid,
      &head_cfg(),
      &classes,
      80,
      (640.0, 640.0),
      0.1,
      NormPolicy::Legacy,
      &mut out,
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].class_id, 5);
  }

  #[test]
  fn test_decode_is_deterministic() {
    let mut data = Vec::new();
    // 2x2 网格、1 锚框的伪随机张量
    for i in 0..(2 * 2 * 85) {
      data.push(((i * 37 % 100) as f32) / 100.0);
    }
    let head = OutputHead {
      data: &data,
      nx: 2,
      ny: 2,
    };
    let grid = Grid::build(2, 2);
    let classes = ClassTable::coco(&[2, 5, 7]);

    let mut first = Vec::new();
    let mut second = Vec::new();
    for out in [&mut first, &mut second] {
      decode_head(
        &head,
        &grid,
        &head_cfg(),
        &classes,
        80,
        (640.0, 640.0),
        0.1,
        NormPolicy::Legacy,
        out,
      );
    }

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
      assert_eq!(a.bbox, b.bbox);
      assert_eq!(a.class_id, b.class_id);
      assert_eq!(a.score, b.score);
    }
  }

  #[test]
  fn test_norm_policy() {
    let data = one_cell_tensor(0.9, 2, 0.95);
    let head = OutputHead {
      data: &data,
      nx: 1,
      ny: 1,
    };
    let grid = Grid::build(1, 1);
    let classes = ClassTable::coco(&[2]);

    let mut legacy = Vec::new();
    decode_head(
      &head,
      &grid,
      &head_cfg(),
      &classes,
      80,
      (1280.0, 640.0),
      0.1,
      NormPolicy::Legacy,
      &mut legacy,
    );
    let mut corrected = Vec::new();
    decode_head(
      &head,
      &grid,
      &head_cfg(),
      &classes,
      80,
      (1280.0, 640.0),
      0.1,
      NormPolicy::Corrected,
      &mut corrected,
    );

    // Legacy: 宽度除以输入高度
    assert!((legacy[0].bbox[2] - 10.0 / 640.0).abs() < 1e-6);
    // Corrected: 宽度除以输入宽度
    assert!((corrected[0].bbox[2] - 10.0 / 1280.0).abs() < 1e-6);
    assert_eq!(legacy[0].bbox[3], corrected[0].bbox[3]);
  }

  #[test]
  fn test_truncated_tensor_does_not_panic() {
    // 数据只够半个格点，其余跳过
    let data = vec![0.9f32; 40];
    let head = OutputHead {
      data: &data,
      nx: 2,
      ny: 2,
    };
    let grid = Grid::build(2, 2);
    let classes = ClassTable::coco(&[2]);
    let mut out = Vec::new();

    decode_head(
      &head,
      &grid,
      &head_cfg(),
      &classes,
      80,
      (640.0, 640.0),
      0.1,
      NormPolicy::Legacy,
      &mut out,
    );
    assert!(out.is_empty());
  }
}
