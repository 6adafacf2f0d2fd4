// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/capture/v4l_camera.rs - V4L2 静态拍摄
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

use std::path::Path;

use image::RgbImage;
use tracing::{debug, error};
use url::Url;
use v4l::{
  FourCC, buffer::Type, io::mmap::Stream, io::traits::CaptureStream, prelude::*, video::Capture,
};

use crate::{FromUrl, FromUrlWithScheme, capture::CaptureError, capture::StillCamera, decoded_path};

const DEFAULT_DEVICE: &str = "/dev/video0";

/// 每次拍摄时打开设备，丢弃若干预热帧（等待自动曝光稳定）后取一帧 YUYV 图像，
/// 转为 RGB 后编码写出。
#[derive(Debug, Clone)]
pub struct V4lStillCamera {
  device_path: String,
  width: u32,
  height: u32,
  warmup: usize,
}

impl FromUrlWithScheme for V4lStillCamera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lStillCamera {
  type Error = CaptureError;

  /// `v4l:///dev/video0?width=1280&height=720&warmup=5`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CaptureError::SchemeMismatch);
    }

    let path = decoded_path(url);
    let mut camera = Self {
      device_path: if path.is_empty() || path == "/" {
        DEFAULT_DEVICE.to_string()
      } else {
        path
      },
      width: 640,
      height: 480,
      warmup: 3,
    };

    for (key, value) in url.query_pairs() {
      let invalid = || CaptureError::InvalidOption(format!("{}={}", key, value));
      match key.as_ref() {
        "width" => camera.width = value.parse().map_err(|_| invalid())?,
        "height" => camera.height = value.parse().map_err(|_| invalid())?,
        "warmup" => camera.warmup = value.parse().map_err(|_| invalid())?,
        _ => {}
      }
    }

    Ok(camera)
  }
}

impl V4lStillCamera {
  fn grab(&self) -> Result<RgbImage, CaptureError> {
    let device = Device::with_path(&self.device_path)
      .map_err(|e| CaptureError::Camera(format!("无法打开设备 {}: {}", self.device_path, e)))?;

    let mut format = device
      .format()
      .map_err(|e| CaptureError::Camera(e.to_string()))?;
    format.width = self.width;
    format.height = self.height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device
      .set_format(&format)
      .map_err(|e| CaptureError::Camera(e.to_string()))?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(CaptureError::Camera(format!(
        "设备不支持 YUYV, 实际格式 {}",
        format.fourcc
      )));
    }

    let mut stream = Stream::with_buffers(&device, Type::VideoCapture, 4)
      .map_err(|e| CaptureError::Camera(format!("无法创建捕获流: {}", e)))?;
    for _ in 0..self.warmup {
      stream
        .next()
        .map_err(|e| CaptureError::Camera(format!("无法捕获帧: {}", e)))?;
    }
    let (buffer, _meta) = stream
      .next()
      .map_err(|e| CaptureError::Camera(format!("无法捕获帧: {}", e)))?;

    debug!("捕获 {}x{} YUYV 帧", format.width, format.height);
    RgbImage::from_raw(
      format.width,
      format.height,
      yuyv_to_rgb(buffer, format.width, format.height),
    )
    .ok_or_else(|| CaptureError::Camera("无法创建 RGB 图像".to_string()))
  }
}

impl StillCamera for V4lStillCamera {
  type Error = CaptureError;

  fn capture_to(&mut self, path: &Path) -> Result<(), Self::Error> {
    let image = self.grab()?;
    image.save(path).map_err(|source| CaptureError::Encode {
      path: path.to_path_buf(),
      source,
    })
  }
}

// 每 4 字节 (Y0 U Y1 V) 对应两个像素
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let pixels = (width * height) as usize;
  let mut rgb = Vec::with_capacity(pixels * 3);

  for chunk in yuyv.chunks_exact(4).take(pixels / 2) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}
