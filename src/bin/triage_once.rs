// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/bin/triage_once.rs - 单次处理待处理目录
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shaobing::{
  FromUrl,
  args::TriageOnceArgs,
  input::PendingImages,
  model::{InferenceSession, RknnSessionBuilder},
  task::BatchOrchestrator,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = TriageOnceArgs::parse();
  let pipeline = &args.pipeline;

  info!("模型: {}", pipeline.model);
  info!("源目录: {}", pipeline.source.display());

  let mut session = RknnSessionBuilder::from_url(&pipeline.model)?.build()?;
  let orchestrator = BatchOrchestrator::new(
    session.layout(),
    pipeline.channel_order,
    pipeline.batch_policy,
    pipeline.directory_output(),
  )?;

  let summary = orchestrator.run_pass(&mut session, &PendingImages::new(&pipeline.source))?;
  info!(
    "共 {} 张: 阳性 {}, 阴性 {}, 跳过 {}, 写出失败 {}, 丢弃检测行 {}",
    summary.seen,
    summary.positives,
    summary.negatives,
    summary.skipped,
    summary.write_failures,
    summary.decode_errors
  );

  Ok(())
}
