// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/grid.rs - 检测头网格表
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

/// 单个检测头的网格坐标表。
///
/// 模型加载、输出形状确定后构建一次，行主序存放 `(cell_x, cell_y)`，
/// 解码阶段只读。模型重载（形状变化）时重建。
#[derive(Debug, Clone)]
pub struct Grid {
  nx: usize,
  ny: usize,
  cells: Box<[(u32, u32)]>,
}

impl Grid {
  /// 构建 `ny x nx` 网格表，行 `dy` 列 `dx` 处为 `(dx, dy)`。
  pub fn build(nx: usize, ny: usize) -> Self {
    let mut cells = Vec::with_capacity(nx * ny);
    for dy in 0..ny {
      for dx in 0..nx {
        cells.push((dx as u32, dy as u32));
      }
    }

    Self {
      nx,
      ny,
      cells: cells.into_boxed_slice(),
    }
  }

  pub fn nx(&self) -> usize {
    self.nx
  }

  pub fn ny(&self) -> usize {
    self.ny
  }

  pub fn len(&self) -> usize {
    self.cells.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cells.is_empty()
  }

  /// 行 `dy` 列 `dx` 处的网格坐标。
  pub fn at(&self, dx: usize, dy: usize) -> (u32, u32) {
    self.cells[dy * self.nx + dx]
  }

  /// 与实际上报的输出形状是否一致。
  pub fn matches(&self, nx: usize, ny: usize) -> bool {
    self.nx == nx && self.ny == ny
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_grid_cell_is_col_row() {
    let grid = Grid::build(4, 3);
    assert_eq!(grid.len(), 12);
    for dy in 0..3 {
      for dx in 0..4 {
        assert_eq!(grid.at(dx, dy), (dx as u32, dy as u32));
      }
    }
  }

  #[test]
  fn test_grid_non_square() {
    let grid = Grid::build(80, 40);
    assert_eq!(grid.len(), 80 * 40);
    assert_eq!(grid.at(79, 0), (79, 0));
    assert_eq!(grid.at(0, 39), (0, 39));
    assert!(grid.matches(80, 40));
    assert!(!grid.matches(40, 80));
  }

  #[test]
  fn test_grid_degenerate() {
    let grid = Grid::build(0, 7);
    assert!(grid.is_empty());
    let grid = Grid::build(1, 1);
    assert_eq!(grid.len(), 1);
    assert_eq!(grid.at(0, 0), (0, 0));
  }
}
