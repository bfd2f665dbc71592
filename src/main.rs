// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use chepai::{
  FromUrl,
  config::PipelineConfig,
  detector::Detector,
  engine::{IdentityPoseSource, PoseMode},
  input::{ReplayEngine, ReplayInput},
  output::OutputWrapper,
  scheduler::{FrameScheduler, FrameSignal},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  let mut config = match &args.config {
    Some(path) => PipelineConfig::from_file(path)?,
    None => PipelineConfig::default(),
  };
  if let Some(confidence) = args.confidence {
    config.score_threshold = confidence;
  }
  if let Some(nms_threshold) = args.nms_threshold {
    config.iou_threshold = nms_threshold;
  }
  config.validate()?;

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!(
    "置信度阈值: {}, IOU 阈值: {}",
    config.score_threshold, config.iou_threshold
  );

  let detector = Detector::new(config)?;
  let input = ReplayInput::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let mut scheduler = FrameScheduler::new(
    detector,
    ReplayEngine::default(),
    IdentityPoseSource,
    output,
    PoseMode::Immediate,
  );
  scheduler.detector_mut().bind_heads(&input.shapes());

  let (tx, rx) = std::sync::mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .expect("Error setting Ctrl-C handler");

  info!("开始处理...");
  let mut frame_index = 0u64;
  let mut total_detections = 0usize;

  for frame in input {
    if args.max_frames > 0 && frame_index >= args.max_frames {
      info!("已达到最大帧数限制: {}", args.max_frames);
      break;
    }

    let signal = scheduler.on_frame_available(&frame, frame.timestamp)?;
    if signal == FrameSignal::Started {
      // 回放模式下推理是离线完成的，提交后立即回灌输出张量
      let heads = frame.heads_view();
      let result = scheduler.on_inference_finished(&heads)?;
      if !result.is_empty() {
        info!(
          "帧 {} (时间戳 {:.3}): 检测到 {} 个目标",
          frame_index,
          frame.timestamp,
          result.len()
        );
      }
      total_detections += result.len();
    }
    frame_index += 1;

    if rx.try_recv().is_ok() {
      warn!("中断信号接收，退出处理循环");
      break;
    }
  }

  info!("处理完成!");
  info!("总帧数: {}", frame_index);
  info!("总检测数: {}", total_detections);

  Ok(())
}
