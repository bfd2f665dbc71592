// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/detector/nms.rs - 非极大值抑制
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

use crate::config::NmsPolicy;
use crate::detector::Candidate;

/// 两个中心-宽高框的交并比。
///
/// 宽或高为非正数的框面积记为零，与任何框的 IoU 都是 0，
/// 自然被抑制而不会崩溃。
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let area_a = a[2].max(0.0) * a[3].max(0.0);
  let area_b = b[2].max(0.0) * b[3].max(0.0);

  let ax1 = a[0] - a[2] / 2.0;
  let ay1 = a[1] - a[3] / 2.0;
  let ax2 = a[0] + a[2] / 2.0;
  let ay2 = a[1] + a[3] / 2.0;
  let bx1 = b[0] - b[2] / 2.0;
  let by1 = b[1] - b[3] / 2.0;
  let bx2 = b[0] + b[2] / 2.0;
  let by2 = b[1] + b[3] / 2.0;

  let inter_w = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
  let inter_h = (ay2.min(by2) - ay1.max(by1)).max(0.0);
  let intersection = inter_w * inter_h;
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

/// 贪心非极大值抑制。
///
/// 1. 丢弃得分不高于 `score_threshold` 的候选（解码阶段已过滤一次，
///    两个阈值可在运行期独立调整，故再设防）；
/// 2. 按得分稳定降序排序，同分保持输入顺序；
/// 3. 依次遍历，未被抑制者把与其 IoU 超过 `iou_threshold` 的后续候选
///    标记为抑制；`ClassAgnostic` 跨类别比较，`PerClass` 只比较同类；
/// 4. 返回按得分降序的幸存者。
///
/// 阈值过滤后复杂度 O(n²)。
pub fn suppress(
  candidates: &[Candidate],
  score_threshold: f32,
  iou_threshold: f32,
  policy: NmsPolicy,
) -> Vec<Candidate> {
  let mut order: Vec<usize> = (0..candidates.len())
    .filter(|&i| candidates[i].score > score_threshold)
    .collect();
  // sort_by 为稳定排序，同分时保持输入顺序，行为确定
  order.sort_by(|&a, &b| {
    candidates[b]
      .score
      .partial_cmp(&candidates[a].score)
      .unwrap_or(std::cmp::Ordering::Equal)
  });

  let mut suppressed = vec![false; order.len()];
  let mut survivors = Vec::new();

  for i in 0..order.len() {
    if suppressed[i] {
      continue;
    }
    let best = &candidates[order[i]];
    survivors.push(best.clone());

    for j in (i + 1)..order.len() {
      if suppressed[j] {
        continue;
      }
      let other = &candidates[order[j]];
      if policy == NmsPolicy::PerClass && other.class_id != best.class_id {
        continue;
      }
      if iou(&best.bbox, &other.bbox) > iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  survivors
}
