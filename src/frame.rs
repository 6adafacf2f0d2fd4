// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/frame.rs - 帧与输入张量定义
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum ShapeError {
  #[error("无法读取图像文件 {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无法解码图像文件 {path}: {source}")]
  Decode {
    path: PathBuf,
    source: image::ImageError,
  },
  #[error("批次大小不匹配: 期望 {expected}, 实际 {actual}")]
  BatchSize { expected: usize, actual: usize },
  #[error("图像尺寸无效 {path}: {width}x{height}")]
  EmptyImage {
    path: PathBuf,
    width: u32,
    height: u32,
  },
}

/// 图像原始尺寸，用于把归一化坐标还原到像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalDims {
  pub height: u32,
  pub width: u32,
}

impl OriginalDims {
  pub fn new(height: u32, width: u32) -> Self {
    Self { height, width }
  }
}

/// 一张待处理的源图像
#[derive(Debug, Clone)]
pub struct Frame {
  path: PathBuf,
  image: RgbImage,
}

impl Frame {
  pub fn new(path: impl Into<PathBuf>, image: RgbImage) -> Result<Self, ShapeError> {
    let path = path.into();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(ShapeError::EmptyImage {
        path,
        width,
        height,
      });
    }
    Ok(Self { path, image })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 源文件名，输出目录中沿用同名文件
  pub fn file_name(&self) -> String {
    self
      .path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.path.display().to_string())
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn dims(&self) -> OriginalDims {
    OriginalDims::new(self.image.height(), self.image.width())
  }
}

/// NCHW 排布的 u8 输入张量
#[derive(Debug, Clone, PartialEq)]
pub struct NchwTensor {
  batch: usize,
  channels: usize,
  height: usize,
  width: usize,
  data: Box<[u8]>,
}

impl NchwTensor {
  pub fn zeros(batch: usize, channels: usize, height: usize, width: usize) -> Self {
    let data = vec![0u8; batch * channels * height * width].into_boxed_slice();
    Self {
      batch,
      channels,
      height,
      width,
      data,
    }
  }

  /// `[n, c, h, w]`
  pub fn shape(&self) -> [usize; 4] {
    [self.batch, self.channels, self.height, self.width]
  }

  pub fn as_nchw(&self) -> &[u8] {
    &self.data
  }

  pub fn get(&self, n: usize, c: usize, h: usize, w: usize) -> u8 {
    self.data[self.index(n, c, h, w)]
  }

  pub(crate) fn set(&mut self, n: usize, c: usize, h: usize, w: usize, value: u8) {
    let index = self.index(n, c, h, w);
    self.data[index] = value;
  }

  /// 把第 `from` 个批次槽位整体复制到第 `to` 个槽位
  pub(crate) fn copy_slot(&mut self, from: usize, to: usize) {
    let slot = self.channels * self.height * self.width;
    self.data.copy_within(from * slot..(from + 1) * slot, to * slot);
  }

  fn index(&self, n: usize, c: usize, h: usize, w: usize) -> usize {
    ((n * self.channels + c) * self.height + h) * self.width + w
  }
}

/// 每张图像一行的辅助信息张量：`[h, w, 1.0, ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfoTensor {
  rows: usize,
  cols: usize,
  data: Box<[f32]>,
}

impl ImageInfoTensor {
  pub fn new(rows: usize, cols: usize, height: usize, width: usize) -> Self {
    let mut data = vec![1.0f32; rows * cols];
    for row in data.chunks_exact_mut(cols) {
      row[0] = height as f32;
      row[1] = width as f32;
    }
    Self {
      rows,
      cols,
      data: data.into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> [usize; 2] {
    [self.rows, self.cols]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn row(&self, index: usize) -> &[f32] {
    &self.data[index * self.cols..(index + 1) * self.cols]
  }
}
