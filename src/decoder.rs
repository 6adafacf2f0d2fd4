// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/decoder.rs - SSD 检测输出解码
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
use tracing::{debug, warn};

use crate::{frame::OriginalDims, model::OutputTensor};

/// 置信度严格大于该值的行才是有效检测，其余为填充行
pub const VALID_ROW_CONFIDENCE: f32 = 0.0;

const FIELD_IMAGE_ID: usize = 0;
const FIELD_LABEL: usize = 1;
const FIELD_CONFIDENCE: usize = 2;
const FIELD_BOX: usize = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("第 {row} 行: 图像索引 {index} 超出批次范围 [0, {batch})")]
  ImageIndexOutOfRange { row: usize, index: f32, batch: usize },
  #[error("第 {row} 行: 字段 {field} 的值 {value} 无效")]
  MalformedField {
    row: usize,
    field: &'static str,
    value: f32,
  },
}

/// 归一化坐标 `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
  pub xmin: f32,
  pub ymin: f32,
  pub xmax: f32,
  pub ymax: f32,
}

/// 原图像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
  pub xmin: u32,
  pub ymin: u32,
  pub xmax: u32,
  pub ymax: u32,
}

impl NormalizedBox {
  /// 按原图尺寸还原为像素坐标，四舍五入并限制在 `[0, width)` / `[0, height)`
  pub fn to_pixels(&self, dims: OriginalDims) -> PixelBox {
    PixelBox {
      xmin: scale(self.xmin, dims.width),
      ymin: scale(self.ymin, dims.height),
      xmax: scale(self.xmax, dims.width),
      ymax: scale(self.ymax, dims.height),
    }
  }
}

fn scale(value: f32, extent: u32) -> u32 {
  let scaled = (f64::from(value) * f64::from(extent)).round();
  (scaled.max(0.0) as u32).min(extent.saturating_sub(1))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionProposal {
  /// 在输出张量中的行号，即排名
  pub row: usize,
  pub image_index: usize,
  pub label: i32,
  pub confidence: f32,
  pub bbox: NormalizedBox,
  pub pixels: PixelBox,
}

/// 一次解码的结果。被丢弃的行以错误形式保留，便于上层统计。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
  pub proposals: Vec<DetectionProposal>,
  pub errors: Vec<DecodeError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionDecoder;

impl DetectionDecoder {
  /// 按输出顺序扫描所有行。填充行不一定连续位于末尾，因此不提前退出。
  pub fn decode(&self, output: &OutputTensor, original_dims: &[OriginalDims]) -> Decoded {
    let mut decoded = Decoded::default();

    for (row, fields) in output.rows().enumerate() {
      let confidence = fields[FIELD_CONFIDENCE];
      if confidence.is_nan() || confidence <= VALID_ROW_CONFIDENCE {
        continue;
      }

      match Self::decode_row(row, fields, original_dims) {
        Ok(proposal) => {
          debug!(
            "[{},{}] 元素, prob = {:.6}    ({},{})-({},{}) batch id : {}",
            row,
            proposal.label,
            proposal.confidence,
            proposal.pixels.xmin,
            proposal.pixels.ymin,
            proposal.pixels.xmax,
            proposal.pixels.ymax,
            proposal.image_index
          );
          decoded.proposals.push(proposal);
        }
        Err(err) => {
          warn!("丢弃检测行: {}, 原始数据: {:?}", err, fields);
          decoded.errors.push(err);
        }
      }
    }

    debug!(
      "解码完成: {} 个有效检测, {} 个错误行",
      decoded.proposals.len(),
      decoded.errors.len()
    );
    decoded
  }

  fn decode_row(
    row: usize,
    fields: &[f32],
    original_dims: &[OriginalDims],
  ) -> Result<DetectionProposal, DecodeError> {
    let raw_index = finite(row, "image_id", fields[FIELD_IMAGE_ID])?;
    if raw_index < 0.0 || raw_index.trunc() as usize >= original_dims.len() {
      return Err(DecodeError::ImageIndexOutOfRange {
        row,
        index: raw_index,
        batch: original_dims.len(),
      });
    }
    let image_index = raw_index.trunc() as usize;
    let label = finite(row, "label", fields[FIELD_LABEL])?.trunc() as i32;

    let bbox = NormalizedBox {
      xmin: finite(row, "xmin", fields[FIELD_BOX])?,
      ymin: finite(row, "ymin", fields[FIELD_BOX + 1])?,
      xmax: finite(row, "xmax", fields[FIELD_BOX + 2])?,
      ymax: finite(row, "ymax", fields[FIELD_BOX + 3])?,
    };

    Ok(DetectionProposal {
      row,
      image_index,
      label,
      confidence: fields[FIELD_CONFIDENCE],
      bbox,
      pixels: bbox.to_pixels(original_dims[image_index]),
    })
  }
}

fn finite(row: usize, field: &'static str, value: f32) -> Result<f32, DecodeError> {
  if value.is_finite() {
    Ok(value)
  } else {
    Err(DecodeError::MalformedField { row, field, value })
  }
}
