// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/model.rs - 模型拓扑与推理会话
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

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::frame::{ImageInfoTensor, NchwTensor, RGB_CHANNELS};

/// 每条检测记录的字段数: image_id, label, conf, xmin, ymin, xmax, ymax
pub const DETECTION_OBJECT_SIZE: usize = 7;

const DEFAULT_IMAGE_INPUT_NAME: &str = "image_tensor";
const DEFAULT_INFO_INPUT_NAME: &str = "image_info";
const DEFAULT_OUTPUT_NAME: &str = "detection_out";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
  #[error("模型输入数量必须为 1 或 2, 实际为 {0}")]
  InputCount(usize),
  #[error("模型缺少 4 维图像输入")]
  MissingImageInput,
  #[error("图像输入 {name} 形状无效: {dims:?}")]
  ImageInputShape { name: String, dims: Vec<usize> },
  #[error("图像输入通道数应为 3, 实际为 {0}")]
  Channels(usize),
  #[error("辅助输入 {name} 形状无效: {dims:?}, 应为 2 维且包含 3 或 6 列")]
  InfoInputShape { name: String, dims: Vec<usize> },
  #[error("输出维度数应为 4, 实际为 {rank}: {dims:?}")]
  OutputRank { rank: usize, dims: Vec<usize> },
  #[error("输出最后一维应为 7, 实际为 {0}")]
  ObjectSize(usize),
  #[error("形状描述无效: {0}")]
  ShapeSyntax(String),
  #[error("缺少模型参数: {0}")]
  MissingParameter(&'static str),
}

#[derive(Error, Debug)]
pub enum DeviceError {
  #[error("模型加载错误 {path}: {source}")]
  ModelLoad {
    path: String,
    source: std::io::Error,
  },
  #[error("模型路径错误: {0}")]
  ModelPath(String),
  #[error("不支持的加速器目标: {0}")]
  UnsupportedTarget(String),
  #[error("加速器运行时错误: {0}")]
  Runtime(String),
  #[error("后端不支持该输入: {0}")]
  UnsupportedInput(String),
  #[error("输出张量与声明形状 {dims:?} 不符, 数据长度 {len}")]
  OutputShape { dims: [usize; 4], len: usize },
}

/// 模型声明的一个张量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
  pub name: String,
  pub dims: Vec<usize>,
}

impl TensorDesc {
  pub fn new(name: impl Into<String>, dims: impl Into<Vec<usize>>) -> Self {
    Self {
      name: name.into(),
      dims: dims.into(),
    }
  }
}

/// 模型对外声明的输入输出形状
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLayout {
  pub inputs: Vec<TensorDesc>,
  pub output: TensorDesc,
}

impl ModelLayout {
  /// 从模型 URL 的查询参数中读取声明形状，例如
  /// `?input=1x3x300x300&output=1x1x100x7&info=1x3`
  pub fn from_query(url: &Url) -> Result<Self, ConfigurationError> {
    let mut input = None;
    let mut output = None;
    let mut info = None;
    let mut input_name = DEFAULT_IMAGE_INPUT_NAME.to_string();
    let mut info_name = DEFAULT_INFO_INPUT_NAME.to_string();

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "input" => input = Some(parse_dims(&value)?),
        "output" => output = Some(parse_dims(&value)?),
        "info" => info = Some(parse_dims(&value)?),
        "input_name" => input_name = value.into_owned(),
        "info_name" => info_name = value.into_owned(),
        _ => {}
      }
    }

    let mut inputs = vec![TensorDesc::new(
      input_name,
      input.ok_or(ConfigurationError::MissingParameter("input"))?,
    )];
    if let Some(dims) = info {
      inputs.push(TensorDesc::new(info_name, dims));
    }
    let output = TensorDesc::new(
      DEFAULT_OUTPUT_NAME,
      output.ok_or(ConfigurationError::MissingParameter("output"))?,
    );

    Ok(Self { inputs, output })
  }

  /// 校验为本项目支持的 SSD 检测拓扑，失败即为配置错误
  pub fn topology(&self) -> Result<DetectionTopology, ConfigurationError> {
    if self.inputs.is_empty() || self.inputs.len() > 2 {
      error!("模型输入数量 {} 不受支持", self.inputs.len());
      return Err(ConfigurationError::InputCount(self.inputs.len()));
    }

    let image_index = self
      .inputs
      .iter()
      .position(|desc| desc.dims.len() == 4)
      .ok_or(ConfigurationError::MissingImageInput)?;
    let image = &self.inputs[image_index];
    let (batch, channels, height, width) =
      (image.dims[0], image.dims[1], image.dims[2], image.dims[3]);
    if batch == 0 || height == 0 || width == 0 {
      return Err(ConfigurationError::ImageInputShape {
        name: image.name.clone(),
        dims: image.dims.clone(),
      });
    }
    if channels != RGB_CHANNELS {
      return Err(ConfigurationError::Channels(channels));
    }

    let other = self
      .inputs
      .iter()
      .enumerate()
      .find(|(index, _)| *index != image_index)
      .map(|(_, desc)| desc);
    let info_input = match other {
      None => None,
      Some(desc) => {
        if desc.dims.len() != 2 || !matches!(desc.dims[1], 3 | 6) {
          error!("辅助输入 {} 形状无效: {:?}", desc.name, desc.dims);
          return Err(ConfigurationError::InfoInputShape {
            name: desc.name.clone(),
            dims: desc.dims.clone(),
          });
        }
        Some(InfoInput {
          name: desc.name.clone(),
          cols: desc.dims[1],
        })
      }
    };

    let dims = &self.output.dims;
    if dims.len() != 4 {
      error!("SSD 模型输出维度不正确: {:?}", dims);
      return Err(ConfigurationError::OutputRank {
        rank: dims.len(),
        dims: dims.clone(),
      });
    }
    if dims[3] != DETECTION_OBJECT_SIZE {
      error!("输出最后一维应为 {}: {:?}", DETECTION_OBJECT_SIZE, dims);
      return Err(ConfigurationError::ObjectSize(dims[3]));
    }

    let topology = DetectionTopology {
      image_input: image.name.clone(),
      batch,
      channels,
      height,
      width,
      info_input,
      output_dims: [dims[0], dims[1], dims[2], dims[3]],
    };
    debug!("模型拓扑: {:?}", topology);
    Ok(topology)
  }
}

fn parse_dims(text: &str) -> Result<Vec<usize>, ConfigurationError> {
  text
    .split(['x', 'X', ','])
    .map(|part| {
      part
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigurationError::ShapeSyntax(text.to_string()))
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoInput {
  pub name: String,
  pub cols: usize,
}

/// 已校验的检测网络拓扑
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionTopology {
  pub image_input: String,
  pub batch: usize,
  pub channels: usize,
  pub height: usize,
  pub width: usize,
  pub info_input: Option<InfoInput>,
  pub output_dims: [usize; 4],
}

impl DetectionTopology {
  pub fn max_proposals(&self) -> usize {
    self.output_dims[0] * self.output_dims[1] * self.output_dims[2]
  }
}

/// 模型原始输出 `[1, 1, N, 7]`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  dims: [usize; 4],
  data: Box<[f32]>,
}

impl OutputTensor {
  pub fn new(dims: [usize; 4], data: Vec<f32>) -> Result<Self, DeviceError> {
    if dims[3] != DETECTION_OBJECT_SIZE || dims.iter().product::<usize>() != data.len() {
      return Err(DeviceError::OutputShape {
        dims,
        len: data.len(),
      });
    }
    Ok(Self {
      dims,
      data: data.into_boxed_slice(),
    })
  }

  /// 以 `[1, 1, rows.len(), 7]` 形状构造
  pub fn from_rows(rows: &[[f32; DETECTION_OBJECT_SIZE]]) -> Self {
    Self {
      dims: [1, 1, rows.len(), DETECTION_OBJECT_SIZE],
      data: rows.iter().flatten().copied().collect(),
    }
  }

  pub fn dims(&self) -> [usize; 4] {
    self.dims
  }

  pub fn rows(&self) -> std::slice::ChunksExact<'_, f32> {
    self.data.chunks_exact(DETECTION_OBJECT_SIZE)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedInput<T> {
  pub name: String,
  pub tensor: T,
}

/// 一次推理的全部输入
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
  pub image: NamedInput<NchwTensor>,
  pub info: Option<NamedInput<ImageInfoTensor>>,
}

/// 加速器上的推理会话。进程内只创建一次，批次之间复用。
pub trait InferenceSession {
  fn layout(&self) -> &ModelLayout;

  /// 阻塞执行一次前向推理
  fn infer(&mut self, inputs: &ModelInputs) -> Result<OutputTensor, DeviceError>;
}

#[cfg(feature = "rknpu")]
mod rknn;
#[cfg(feature = "rknpu")]
pub use self::rknn::{RknnSession, RknnSessionBuilder};
