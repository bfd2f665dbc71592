// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/engine.rs - 外部推理引擎与相机位姿接口
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

/// 一个输出头的原始张量视图。
///
/// 缓冲区归外部推理引擎所有，本库在一次解码过程中只持有只读借用。
/// 逻辑布局为 `[ny, nx, num_anchors, num_classes + 5]` 展平后的一维数组。
#[derive(Debug, Clone, Copy)]
pub struct OutputHead<'a> {
  /// 展平的浮点缓冲区
  pub data: &'a [f32],
  /// 空间宽度
  pub nx: usize,
  /// 空间高度
  pub ny: usize,
}

/// 某一时间戳的相机位姿估计。本库不解释矩阵内容，只负责在
/// 触发推理前解算并透传给引擎。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
  /// 行主序 4x4 世界变换
  pub transform: [f32; 16],
  /// 位姿对应的时间戳（秒）
  pub timestamp: f64,
}

impl CameraPose {
  pub fn identity(timestamp: f64) -> Self {
    let mut transform = [0.0; 16];
    transform[0] = 1.0;
    transform[5] = 1.0;
    transform[10] = 1.0;
    transform[15] = 1.0;
    Self {
      transform,
      timestamp,
    }
  }
}

/// 位姿解算模式。
///
/// 编辑器/录制环境直接取当前位姿，真机环境按帧时间戳估计。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoseMode {
  Immediate,
  #[default]
  Estimated,
}

/// 相机位姿来源，由宿主环境提供。
pub trait PoseSource {
  type Error: std::error::Error + Sync + Send + 'static;

  /// 当前位姿（编辑器/录制模式）。
  fn current(&mut self) -> Result<CameraPose, Self::Error>;

  /// 估计给定时间戳处的位姿（真机模式）。
  fn estimate_at(&mut self, timestamp: f64) -> Result<CameraPose, Self::Error>;
}

/// 总是返回单位位姿的来源，用于回放输入和编辑器环境。
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPoseSource;

impl PoseSource for IdentityPoseSource {
  type Error = std::convert::Infallible;

  fn current(&mut self) -> Result<CameraPose, Self::Error> {
    Ok(CameraPose::identity(0.0))
  }

  fn estimate_at(&mut self, timestamp: f64) -> Result<CameraPose, Self::Error> {
    Ok(CameraPose::identity(timestamp))
  }
}

/// 外部推理引擎。
///
/// 本库不加载模型也不执行张量计算，只通过该接口提交一次推理；
/// 完成后由宿主把输出张量送回 `FrameScheduler::on_inference_finished`。
pub trait Engine {
  /// 帧句柄类型，本库不解释其内容
  type Frame;
  type Error: std::error::Error + Sync + Send + 'static;

  /// 提交一次推理。调度器保证同一时刻至多一次在途推理。
  fn submit(&mut self, frame: &Self::Frame, pose: &CameraPose) -> Result<(), Self::Error>;
}
