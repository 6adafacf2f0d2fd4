// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/preprocess.rs - 批次组装与输入张量预处理
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

use std::borrow::Cow;

use image::{RgbImage, imageops::FilterType};
use tracing::{debug, warn};

use crate::{
  frame::{Frame, ImageInfoTensor, NchwTensor, OriginalDims, ShapeError},
  model::{DetectionTopology, ModelInputs, NamedInput},
};

/// 输入张量的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

/// 固定大小为 n 的批次。真实帧不足 n 时用最后一帧补齐，补齐的槽位只参与推理。
#[derive(Debug)]
pub struct Batch<'a> {
  frames: &'a [Frame],
  size: usize,
}

impl<'a> Batch<'a> {
  /// `frames` 不能为空且不能超过 `size`
  pub fn padded(frames: &'a [Frame], size: usize) -> Option<Self> {
    if frames.is_empty() || frames.len() > size {
      return None;
    }
    Some(Self { frames, size })
  }

  pub fn len(&self) -> usize {
    self.size
  }

  pub fn is_empty(&self) -> bool {
    self.size == 0
  }

  /// 真实帧（非补齐）的数量
  pub fn units(&self) -> usize {
    self.frames.len()
  }

  pub fn frames(&self) -> &'a [Frame] {
    self.frames
  }

  /// 第 `slot` 个槽位对应的帧
  pub fn slot(&self, slot: usize) -> &'a Frame {
    &self.frames[slot.min(self.frames.len() - 1)]
  }
}

/// 预处理结果：模型输入与每个槽位的原始尺寸
#[derive(Debug, Clone)]
pub struct PreparedBatch {
  pub inputs: ModelInputs,
  pub original_dims: Vec<OriginalDims>,
}

pub struct FramePreprocessor {
  topology: DetectionTopology,
  order: ChannelOrder,
}

impl FramePreprocessor {
  pub fn new(topology: &DetectionTopology, order: ChannelOrder) -> Self {
    Self {
      topology: topology.clone(),
      order,
    }
  }

  pub fn batch_size(&self) -> usize {
    self.topology.batch
  }

  pub fn prepare(&self, batch: &Batch<'_>) -> Result<PreparedBatch, ShapeError> {
    let DetectionTopology {
      batch: n,
      channels,
      height,
      width,
      ..
    } = self.topology;

    if batch.len() != n {
      return Err(ShapeError::BatchSize {
        expected: n,
        actual: batch.len(),
      });
    }

    let mut tensor = NchwTensor::zeros(n, channels, height, width);
    let mut original_dims = Vec::with_capacity(n);

    for (slot, frame) in batch.frames().iter().enumerate() {
      let dims = frame.dims();
      original_dims.push(dims);

      let image = self.fit(frame, height as u32, width as u32);
      for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..channels {
          let source = match self.order {
            ChannelOrder::Rgb => c,
            ChannelOrder::Bgr => channels - 1 - c,
          };
          tensor.set(slot, c, y as usize, x as usize, pixel[source]);
        }
      }
    }

    let last = batch.units() - 1;
    for slot in batch.units()..n {
      tensor.copy_slot(last, slot);
      original_dims.push(original_dims[last]);
    }
    debug!(
      "批次预处理完成: {} 张图像, {} 个补齐槽位",
      batch.units(),
      n - batch.units()
    );

    let info = self.topology.info_input.as_ref().map(|info| NamedInput {
      name: info.name.clone(),
      tensor: ImageInfoTensor::new(n, info.cols, height, width),
    });

    Ok(PreparedBatch {
      inputs: ModelInputs {
        image: NamedInput {
          name: self.topology.image_input.clone(),
          tensor,
        },
        info,
      },
      original_dims,
    })
  }

  fn fit<'f>(&self, frame: &'f Frame, height: u32, width: u32) -> Cow<'f, RgbImage> {
    let image = frame.image();
    if image.dimensions() == (width, height) {
      return Cow::Borrowed(image);
    }
    warn!(
      "图像 {} 从 {}x{} 缩放到 {}x{}",
      frame.file_name(),
      image.width(),
      image.height(),
      width,
      height
    );
    Cow::Owned(image::imageops::resize(
      image,
      width,
      height,
      FilterType::Triangle,
    ))
  }
}
