// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser};
use url::Url;

use crate::{
  output::{TriageDirectoryOutput, draw::Draw},
  preprocess::ChannelOrder,
  task::BatchPolicy,
};

/// 检测与分拣参数，两个程序共用
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 模型 URL, 例如 rknn:///opt/models/ssd.rknn?input=1x3x300x300&output=1x1x100x7
  #[arg(long, value_name = "URL")]
  pub model: Url,

  /// 待处理图像目录
  #[arg(long, value_name = "DIR", default_value = "/home/pi/Pictures/cameraImages")]
  pub source: PathBuf,

  /// 阳性图像输出目录
  #[arg(long, value_name = "DIR", default_value = "/home/pi/Pictures/Detection")]
  pub positive: PathBuf,

  /// 阴性图像输出目录
  #[arg(long, value_name = "DIR", default_value = "/home/pi/Pictures/noDetection")]
  pub negative: PathBuf,

  /// 输入张量通道顺序
  #[arg(long, value_enum, default_value_t = ChannelOrder::Rgb)]
  pub channel_order: ChannelOrder,

  /// 组批策略
  #[arg(long, value_enum, default_value_t = BatchPolicy::PerFile)]
  pub batch_policy: BatchPolicy,

  /// 为阳性图像额外写出 JSON 检测记录
  #[arg(long)]
  pub record: bool,

  /// 检测框线宽（像素）
  #[arg(long, value_name = "PX", default_value = "2")]
  pub box_thickness: u32,
}

impl PipelineArgs {
  pub fn directory_output(&self) -> TriageDirectoryOutput {
    TriageDirectoryOutput::new(&self.positive, &self.negative)
      .with_draw(Draw::default().with_thickness(self.box_thickness))
      .with_record(self.record)
  }
}

/// 单次处理源目录中的全部图像
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct TriageOnceArgs {
  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

/// 运动触发连拍并分拣
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct SentinelArgs {
  #[command(flatten)]
  pub pipeline: PipelineArgs,

  /// 运动传感器 URL, 例如 gpio://4?poll_ms=50
  #[arg(long, value_name = "URL", default_value = "gpio://4")]
  pub trigger: Url,

  /// 摄像头 URL, 例如 v4l:///dev/video0?width=1280&height=720
  #[arg(long, value_name = "URL", default_value = "v4l:///dev/video0")]
  pub camera: Url,

  /// 每次运动事件拍摄张数
  #[arg(long, value_name = "COUNT", default_value = "2")]
  pub shots: usize,

  /// 连拍间隔（毫秒）
  #[arg(long, value_name = "MS", default_value = "1000")]
  pub interval_ms: u64,

  /// 处理指定次数的运动事件后退出（不指定则一直运行）
  #[arg(long, value_name = "COUNT")]
  pub max_events: Option<usize>,
}

impl SentinelArgs {
  pub fn interval(&self) -> Duration {
    Duration::from_millis(self.interval_ms)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const MODEL: &str = "rknn:///opt/ssd.rknn?input=1x3x300x300&output=1x1x100x7";

  #[test]
  fn sentinel_defaults() {
    let args = SentinelArgs::try_parse_from(["sentinel", "--model", MODEL]).unwrap();
    assert_eq!(args.pipeline.model.scheme(), "rknn");
    assert_eq!(
      args.pipeline.positive,
      PathBuf::from("/home/pi/Pictures/Detection")
    );
    assert_eq!(args.pipeline.channel_order, ChannelOrder::Rgb);
    assert_eq!(args.pipeline.batch_policy, BatchPolicy::PerFile);
    assert_eq!(args.shots, 2);
    assert_eq!(args.interval(), Duration::from_secs(1));
    assert_eq!(args.trigger.as_str(), "gpio://4");
    assert!(args.max_events.is_none());
  }

  #[test]
  fn triage_once_options() {
    let args = TriageOnceArgs::try_parse_from([
      "triage-once",
      "--model",
      MODEL,
      "--source",
      "/tmp/in",
      "--channel-order",
      "bgr",
      "--batch-policy",
      "fill",
      "--record",
    ])
    .unwrap();
    assert_eq!(args.pipeline.source, PathBuf::from("/tmp/in"));
    assert_eq!(args.pipeline.channel_order, ChannelOrder::Bgr);
    assert_eq!(args.pipeline.batch_policy, BatchPolicy::Fill);
    assert!(args.pipeline.record);
  }

  #[test]
  fn model_is_required_and_must_be_a_url() {
    assert!(TriageOnceArgs::try_parse_from(["triage-once"]).is_err());
    assert!(TriageOnceArgs::try_parse_from(["triage-once", "--model", "ssd.rknn"]).is_err());
  }
}
