// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/model/rknn.rs - RKNPU 推理会话
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  model::{
    ConfigurationError, DetectionTopology, DeviceError, InferenceSession, ModelInputs,
    ModelLayout, OutputTensor,
  },
};

const SUPPORTED_TARGETS: [&str; 2] = ["npu", "rknpu"];

#[derive(Error, Debug)]
pub enum RknnError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),
  #[error(transparent)]
  Device(#[from] DeviceError),
}

/// SSD 检测网络在 RKNPU 上的会话。上下文只创建一次，批次之间复用。
pub struct RknnSession {
  context: Context,
  layout: ModelLayout,
  output_dims: [usize; 4],
}

pub struct RknnSessionBuilder {
  model_path: String,
  layout: ModelLayout,
  target: String,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnSessionBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnSessionBuilder {
  type Error = RknnError;

  /// `rknn:///opt/models/ssd.rknn?input=1x3x300x300&output=1x1x100x7&device=npu`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(
        DeviceError::ModelPath(format!("模型路径必须使用 {} 方案", Self::SCHEME)).into(),
      );
    }

    let model_path = decoded_path(url);
    if model_path.is_empty() || model_path == "/" {
      return Err(DeviceError::ModelPath(url.to_string()).into());
    }

    let target = url
      .query_pairs()
      .find(|(key, _)| key == "device")
      .map(|(_, value)| value.into_owned())
      .unwrap_or_else(|| SUPPORTED_TARGETS[0].to_string());

    Ok(Self {
      model_path,
      layout: ModelLayout::from_query(url)?,
      target,
      flags: InitFlags::default(),
    })
  }
}

impl RknnSessionBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn layout(&self) -> &ModelLayout {
    &self.layout
  }

  pub fn build(self) -> Result<RknnSession, RknnError> {
    // 加载模型之前先校验声明的拓扑
    let DetectionTopology {
      info_input,
      output_dims,
      ..
    } = self.layout.topology()?;
    if let Some(info) = info_input {
      error!("RKNN 后端不支持浮点辅助输入 {}", info.name);
      return Err(DeviceError::UnsupportedInput(info.name).into());
    }
    if !SUPPORTED_TARGETS.contains(&self.target.as_str()) {
      error!("不支持的加速器目标: {}", self.target);
      return Err(DeviceError::UnsupportedTarget(self.target).into());
    }

    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path).map_err(|source| DeviceError::ModelLoad {
      path: self.model_path.clone(),
      source,
    })?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags).map_err(runtime)?;

    if let Ok(version) = context.sdk_version() {
      if let Ok(api_ver) = version.api_version() {
        debug!("模型 API 版本: {}", api_ver);
      }
      if let Ok(drv_ver) = version.driver_version() {
        debug!("模型驱动版本: {}", drv_ver);
      }
    }

    let num_inputs = context.num_inputs().map_err(runtime)?;
    let num_outputs = context.num_outputs().map_err(runtime)?;
    debug!("模型输入数量: {}, 输出数量: {}", num_inputs, num_outputs);
    if num_inputs as usize != self.layout.inputs.len() {
      error!(
        "模型输入数量 {} 与声明 {} 不符",
        num_inputs,
        self.layout.inputs.len()
      );
      return Err(ConfigurationError::InputCount(num_inputs as usize).into());
    }
    if num_outputs < 1 {
      return Err(DeviceError::Runtime("模型没有输出".to_string()).into());
    }

    info!("模型加载完成");
    Ok(RknnSession {
      context,
      layout: self.layout,
      output_dims,
    })
  }
}

fn runtime(err: rknpu::Error) -> DeviceError {
  DeviceError::Runtime(err.to_string())
}

impl InferenceSession for RknnSession {
  fn layout(&self) -> &ModelLayout {
    &self.layout
  }

  fn infer(&mut self, inputs: &ModelInputs) -> Result<OutputTensor, DeviceError> {
    let now = Instant::now();
    debug!("设置模型输入 {}", inputs.image.name);
    self
      .context
      .set_input(
        0,
        inputs.image.tensor.as_nchw(),
        TensorFormat::NCHW,
        TensorType::UInt8,
      )
      .map_err(runtime)?;

    debug!("执行模型推理");
    self.context.run().map_err(runtime)?;

    let output = self.context.get_outputs().map_err(runtime)?;
    let data = output.get_f32(0).map_err(runtime)?.to_vec();
    debug!("获取模型输出 {} 个浮点数, 耗时: {:.2?}", data.len(), now.elapsed());

    OutputTensor::new(self.output_dims, data)
  }
}
