// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/scheduler.rs - 单飞帧调度器
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

use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::detector::{DetectResult, Detector};
use crate::engine::{Engine, OutputHead, PoseMode, PoseSource};
use crate::output::Render;

/// 调度器状态。
///
/// `PoseResolving` 与 `Running` 期间新的帧信号只计数不排队；
/// 推理一旦提交就运行到完成，没有取消也没有超时——永不完成的
/// 推理会静默停住后续帧，这是目标硬件上接受的风险。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Idle,
  PoseResolving,
  Running,
}

/// 一次帧信号的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSignal {
  /// 已解算位姿并提交推理
  Started,
  /// 有推理在途，信号被合并
  Coalesced,
  /// 帧间隔门未到
  Skipped,
}

/// 单飞帧调度器。
///
/// 宿主每个显示刷新调用一次 `on_frame_available`，推理引擎完成后
/// 调用一次 `on_inference_finished`。两次调用之间是唯一的挂起点，
/// 全部逻辑运行在宿主的单线程协作上下文中，`running` 守卫即互斥。
pub struct FrameScheduler<M, P, R> {
  engine: M,
  pose_source: P,
  sink: R,
  detector: Detector,
  pose_mode: PoseMode,
  phase: Phase,
  coalesced: u64,
  last_timestamp: f64,
  frame_counter: u32,
  pass_started: Option<Instant>,
}

impl<M, P, R> FrameScheduler<M, P, R>
where
  M: Engine,
  P: PoseSource,
  R: Render,
{
  pub fn new(detector: Detector, engine: M, pose_source: P, sink: R, pose_mode: PoseMode) -> Self {
    Self {
      engine,
      pose_source,
      sink,
      detector,
      pose_mode,
      phase: Phase::Idle,
      coalesced: 0,
      last_timestamp: 0.0,
      frame_counter: 0,
      pass_started: None,
    }
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn coalesced(&self) -> u64 {
    self.coalesced
  }

  pub fn last_timestamp(&self) -> f64 {
    self.last_timestamp
  }

  pub fn detector(&self) -> &Detector {
    &self.detector
  }

  pub fn detector_mut(&mut self) -> &mut Detector {
    &mut self.detector
  }

  /// 新帧可用。空闲时解算位姿并提交一次推理；否则只把信号计入
  /// 合并计数——不缓存帧，下一次推理开始时自然用上最新的相机数据。
  pub fn on_frame_available(&mut self, frame: &M::Frame, timestamp: f64) -> Result<FrameSignal> {
    if self.phase != Phase::Idle {
      self.coalesced += 1;
      debug!("推理在途，合并帧信号（累计 {}）", self.coalesced);
      return Ok(FrameSignal::Coalesced);
    }

    // 帧间隔门
    self.frame_counter += 1;
    if self.frame_counter < self.detector.config().frame_skip {
      return Ok(FrameSignal::Skipped);
    }
    self.frame_counter = 0;

    self.phase = Phase::PoseResolving;
    self.last_timestamp = timestamp;

    let pose = match self.pose_mode {
      PoseMode::Immediate => self.pose_source.current(),
      PoseMode::Estimated => self.pose_source.estimate_at(timestamp),
    };
    let pose = match pose {
      Ok(pose) => pose,
      Err(e) => {
        // 帧可以丢，守卫不能卡死
        self.phase = Phase::Idle;
        return Err(e).context("位姿解算失败");
      }
    };

    if let Err(e) = self.engine.submit(frame, &pose) {
      self.phase = Phase::Idle;
      return Err(e).context("推理提交失败");
    }

    self.phase = Phase::Running;
    self.pass_started = Some(Instant::now());
    debug!("推理已提交, 时间戳 {:.3}", timestamp);
    Ok(FrameSignal::Started)
  }

  /// 推理完成回调。解码 → 抑制 → 标签解析，把结果交给显示层，
  /// 然后清除运行守卫。空结果是正常结果，不是错误。
  pub fn on_inference_finished(&mut self, heads: &[OutputHead]) -> Result<DetectResult> {
    if self.phase != Phase::Running {
      bail!("未处于推理状态却收到完成回调");
    }

    let result = self.detector.process(heads);

    if let Some(started) = self.pass_started.take() {
      info!(
        "推理完成, 耗时 {:.2?}, 检测到 {} 个目标",
        started.elapsed(),
        result.len()
      );
    }
    if self.coalesced > 0 {
      debug!("本次推理期间合并了 {} 个帧信号", self.coalesced);
    }
    self.coalesced = 0;

    // 渲染失败也要先清除运行守卫，否则调度器会永久卡死
    self.phase = Phase::Idle;

    if let Err(e) = self.sink.render_result(&result) {
      warn!("结果渲染失败: {}", e);
      return Err(e).context("结果渲染失败");
    }

    Ok(result)
  }
}
