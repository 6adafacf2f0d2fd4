// 该文件是 Shaobing （哨兵） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use std::{collections::VecDeque, path::Path};

use image::{Rgb, RgbImage};
use shaobing::model::{
  DeviceError, InferenceSession, ModelInputs, ModelLayout, OutputTensor, TensorDesc,
};

/// 按顺序返回预设输出的推理会话，并记录收到的输入
pub struct ScriptedSession {
  layout: ModelLayout,
  replies: VecDeque<Result<OutputTensor, DeviceError>>,
  pub received: Vec<ModelInputs>,
}

impl ScriptedSession {
  pub fn new(batch: usize, output_dims: &[usize]) -> Self {
    Self {
      layout: ModelLayout {
        inputs: vec![TensorDesc::new("image_tensor", [batch, 3, 300, 300])],
        output: TensorDesc::new("detection_out", output_dims.to_vec()),
      },
      replies: VecDeque::new(),
      received: Vec::new(),
    }
  }

  pub fn reply(mut self, rows: &[[f32; 7]]) -> Self {
    self.replies.push_back(Ok(OutputTensor::from_rows(rows)));
    self
  }

  pub fn fail(mut self, err: DeviceError) -> Self {
    self.replies.push_back(Err(err));
    self
  }
}

impl InferenceSession for ScriptedSession {
  fn layout(&self) -> &ModelLayout {
    &self.layout
  }

  fn infer(&mut self, inputs: &ModelInputs) -> Result<OutputTensor, DeviceError> {
    self.received.push(inputs.clone());
    self
      .replies
      .pop_front()
      .unwrap_or_else(|| Ok(OutputTensor::from_rows(&[[0.0; 7]])))
  }
}

pub fn write_jpeg(path: &Path, width: u32, height: u32, gray: u8) {
  RgbImage::from_pixel(width, height, Rgb([gray, gray, gray]))
    .save(path)
    .unwrap();
}
