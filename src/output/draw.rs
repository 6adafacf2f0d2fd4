// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/output/draw.rs - 检测框绘制
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::decoder::PixelBox;

const BOX_COLOR: [u8; 3] = [244, 35, 232]; // 品红
const BOX_THICKNESS: u32 = 2;

pub struct Draw {
  color: [u8; 3],
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: BOX_COLOR,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = color;
    self
  }

  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  /// 在原图副本上绘制所有检测框
  pub fn annotate(&self, image: &RgbImage, boxes: &[PixelBox]) -> RgbImage {
    let mut canvas = image.clone();
    for bbox in boxes {
      self.draw_bbox(&mut canvas, bbox);
    }
    canvas
  }

  // 边框向内加粗
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &PixelBox) {
    let (x_min, x_max) = (bbox.xmin.min(bbox.xmax), bbox.xmin.max(bbox.xmax));
    let (y_min, y_max) = (bbox.ymin.min(bbox.ymax), bbox.ymin.max(bbox.ymax));

    for t in 0..self.thickness {
      if x_min + t > x_max.saturating_sub(t) || y_min + t > y_max.saturating_sub(t) {
        break;
      }
      let (x0, y0) = (x_min + t, y_min + t);
      let (x1, y1) = (x_max - t, y_max - t);
      let rect = Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0 + 1, y1 - y0 + 1);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }
  }
}
