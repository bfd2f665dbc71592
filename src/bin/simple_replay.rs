// 该文件是 Chepai （车牌夜巡） 项目的一部分。
// src/bin/simple_replay.rs - 单帧回放测试代码
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

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;
use url::Url;

use chepai::{
  FromUrl,
  config::PipelineConfig,
  detector::Detector,
  output::{OutputWrapper, Render},
};

/// Chepai 单帧回放参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 管线配置文件（JSON）
  #[arg(long, value_name = "FILE")]
  pub config: Option<String>,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, default_value = "log:stdout", value_name = "OUTPUT")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = match &args.config {
    Some(path) => PipelineConfig::from_file(path)?,
    None => PipelineConfig::default(),
  };

  let mut detector = Detector::new(config)?;
  let mut input = chepai::input::ReplayInput::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  detector.bind_heads(&input.shapes());

  let frame = input.next().ok_or_else(|| anyhow!("没有输入帧"))?;
  info!("输入帧获取成功，开始后处理...");
  let now = std::time::Instant::now();
  let result = detector.process(&frame.heads_view());
  info!("后处理完成，耗时: {:.2?}", now.elapsed());
  info!("检测到 {} 个目标", result.len());
  output.render_result(&result)?;

  Ok(())
}
