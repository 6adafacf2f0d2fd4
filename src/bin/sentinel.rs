// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/bin/sentinel.rs - 运动触发的检测哨兵
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

use std::{sync::mpsc, thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use shaobing::{
  FromUrl,
  args::SentinelArgs,
  capture::{CaptureBurst, V4lStillCamera},
  model::{InferenceSession, RknnSessionBuilder},
  task::{BatchOrchestrator, SentinelTask},
  trigger::GpioMotionSensor,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = SentinelArgs::parse();
  let pipeline = &args.pipeline;

  info!("模型: {}", pipeline.model);
  info!("运动传感器: {}", args.trigger);
  info!("摄像头: {}", args.camera);

  // 加速器会话在进程内只创建一次
  let mut session = RknnSessionBuilder::from_url(&pipeline.model)?.build()?;
  let orchestrator = BatchOrchestrator::new(
    session.layout(),
    pipeline.channel_order,
    pipeline.batch_policy,
    pipeline.directory_output(),
  )?;

  let trigger = GpioMotionSensor::from_url(&args.trigger)?;
  let burst = CaptureBurst::new(V4lStillCamera::from_url(&args.camera)?, &pipeline.source)
    .with_shots(args.shots)
    .with_interval(args.interval())
    .with_reserved_directories([&pipeline.positive, &pipeline.negative]);

  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法设置 Ctrl-C 处理函数")?;

  let events = SentinelTask::new(trigger, burst, orchestrator)
    .with_max_events(args.max_events)
    .run(&mut session, &rx)?;
  info!("共处理 {} 次运动事件", events);

  Ok(())
}
