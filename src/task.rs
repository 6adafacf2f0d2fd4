// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/task.rs - 批处理编排与哨兵任务循环
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

use std::{fmt::Display, path::PathBuf, sync::mpsc::Receiver, time::Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  capture::{CaptureBurst, CaptureError, StillCamera},
  decoder::DetectionDecoder,
  frame::Frame,
  input::{PendingImages, load_frame},
  model::{ConfigurationError, DeviceError, InferenceSession, ModelLayout},
  output::Render,
  preprocess::{Batch, ChannelOrder, FramePreprocessor},
  triage::{Triage, TriageOutcome},
  trigger::{MotionTrigger, TriggerError, WaitOutcome},
};

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("配置错误: {0}")]
  Configuration(#[from] ConfigurationError),
  #[error("设备错误: {0}")]
  Device(#[from] DeviceError),
  #[error("无法读取源目录 {path}: {source}")]
  SourceDirectory {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("触发器错误: {0}")]
  Trigger(#[from] TriggerError),
  #[error("拍摄错误: {0}")]
  Capture(#[from] CaptureError),
}

/// 源目录中的文件如何组成批次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BatchPolicy {
  /// 每个文件单独成批，不足的槽位用该文件补齐
  #[default]
  PerFile,
  /// 每批最多装入 n 个不同文件
  Fill,
}

/// 一次目录处理的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
  pub seen: usize,
  pub positives: usize,
  pub negatives: usize,
  pub skipped: usize,
  pub write_failures: usize,
  pub decode_errors: usize,
}

/// 对源目录执行一次完整处理：读取、组批、预处理、推理、解码、分拣、写出、删除源文件
pub struct BatchOrchestrator<O> {
  preprocessor: FramePreprocessor,
  decoder: DetectionDecoder,
  triage: Triage,
  policy: BatchPolicy,
  output: O,
}

impl<O> BatchOrchestrator<O>
where
  O: Render<Frame, TriageOutcome>,
  O::Error: Display,
{
  /// 拓扑校验在此完成，处理任何图像之前即可发现配置错误
  pub fn new(
    layout: &ModelLayout,
    order: ChannelOrder,
    policy: BatchPolicy,
    output: O,
  ) -> Result<Self, ConfigurationError> {
    let topology = layout.topology()?;
    info!(
      "模型输入 {}x{}x{}x{}, 最多 {} 个检测, 组批策略 {:?}",
      topology.batch,
      topology.channels,
      topology.height,
      topology.width,
      topology.max_proposals(),
      policy
    );
    Ok(Self {
      preprocessor: FramePreprocessor::new(&topology, order),
      decoder: DetectionDecoder,
      triage: Triage,
      policy,
      output,
    })
  }

  pub fn output(&self) -> &O {
    &self.output
  }

  pub fn run_pass<S: InferenceSession>(
    &self,
    session: &mut S,
    pending: &PendingImages,
  ) -> Result<PassSummary, TaskError> {
    let files = pending
      .scan()
      .map_err(|source| TaskError::SourceDirectory {
        path: pending.directory().to_path_buf(),
        source,
      })?;

    let mut summary = PassSummary {
      seen: files.len(),
      ..Default::default()
    };
    if files.is_empty() {
      debug!("源目录 {} 中没有待处理图像", pending.directory().display());
      return Ok(summary);
    }
    info!("开始处理 {} 张图像", files.len());

    let per_batch = match self.policy {
      BatchPolicy::PerFile => 1,
      BatchPolicy::Fill => self.preprocessor.batch_size(),
    };
    let mut frames = Vec::with_capacity(per_batch);
    for path in files {
      match load_frame(&path) {
        Ok(frame) => frames.push(frame),
        Err(err) => {
          warn!("跳过图像, 保留在源目录: {}", err);
          summary.skipped += 1;
          continue;
        }
      }
      if frames.len() == per_batch {
        self.run_batch(session, &frames, &mut summary)?;
        frames.clear();
      }
    }
    if !frames.is_empty() {
      self.run_batch(session, &frames, &mut summary)?;
    }

    info!(
      "处理完成: 阳性 {}, 阴性 {}, 跳过 {}, 写出失败 {}",
      summary.positives, summary.negatives, summary.skipped, summary.write_failures
    );
    Ok(summary)
  }

  fn run_batch<S: InferenceSession>(
    &self,
    session: &mut S,
    frames: &[Frame],
    summary: &mut PassSummary,
  ) -> Result<(), TaskError> {
    let Some(batch) = Batch::padded(frames, self.preprocessor.batch_size()) else {
      return Ok(());
    };
    let prepared = match self.preprocessor.prepare(&batch) {
      Ok(prepared) => prepared,
      Err(err) => {
        warn!("批次预处理失败, 跳过 {} 张图像: {}", batch.units(), err);
        summary.skipped += batch.units();
        return Ok(());
      }
    };

    let now = Instant::now();
    let output = session.infer(&prepared.inputs)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    let decoded = self.decoder.decode(&output, &prepared.original_dims);
    summary.decode_errors += decoded.errors.len();
    let outcomes = self.triage.classify(&decoded.proposals, batch.units());

    for (frame, outcome) in batch.frames().iter().zip(&outcomes) {
      match self.output.render_result(frame, outcome) {
        Ok(_) => {
          if outcome.is_positive() {
            summary.positives += 1;
          } else {
            summary.negatives += 1;
          }
          remove_source(frame);
        }
        Err(err) => {
          error!("写出 {} 失败, 保留源文件: {}", frame.file_name(), err);
          summary.write_failures += 1;
        }
      }
    }
    Ok(())
  }
}

fn remove_source(frame: &Frame) {
  match std::fs::remove_file(frame.path()) {
    Ok(()) => debug!("已删除源文件 {}", frame.path().display()),
    Err(err) => warn!("删除源文件 {} 失败: {}", frame.path().display(), err),
  }
}

/// 等待运动、连拍、处理目录，循环直到收到取消信号
pub struct SentinelTask<T, C, O> {
  trigger: T,
  burst: CaptureBurst<C>,
  orchestrator: BatchOrchestrator<O>,
  pending: PendingImages,
  max_events: Option<usize>,
}

impl<T, C, O> SentinelTask<T, C, O>
where
  T: MotionTrigger,
  TaskError: From<T::Error>,
  C: StillCamera,
  CaptureError: From<C::Error>,
  O: Render<Frame, TriageOutcome>,
  O::Error: Display,
{
  /// 连拍写入的目录即为处理的源目录
  pub fn new(trigger: T, burst: CaptureBurst<C>, orchestrator: BatchOrchestrator<O>) -> Self {
    let pending = PendingImages::new(burst.directory());
    Self {
      trigger,
      burst,
      orchestrator,
      pending,
      max_events: None,
    }
  }

  /// 处理指定次数的运动事件后退出
  pub fn with_max_events(mut self, max_events: Option<usize>) -> Self {
    self.max_events = max_events;
    self
  }

  /// 返回处理的运动事件数。取消只在等待运动期间生效，不会打断推理。
  pub fn run<S: InferenceSession>(
    &mut self,
    session: &mut S,
    cancel: &Receiver<()>,
  ) -> Result<usize, TaskError> {
    info!("开始任务...");
    let mut events = 0;

    loop {
      match self.trigger.wait_for_motion(cancel)? {
        WaitOutcome::Cancelled => {
          warn!("中断信号接收，退出任务循环");
          break;
        }
        WaitOutcome::Motion => {}
      }
      events += 1;

      let captured = self.burst.run()?;
      info!("第 {} 次运动事件, 拍摄 {} 张图像", events, captured.len());
      let summary = self.orchestrator.run_pass(session, &self.pending)?;
      debug!("{:?}", summary);

      if self.max_events.is_some_and(|n| events >= n) {
        info!("达到指定事件数 {}, 退出任务循环", events);
        break;
      }
    }

    info!("任务完成，退出");
    Ok(events)
  }
}
