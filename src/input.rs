// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/input.rs - 待处理图像目录输入
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

use image::ImageReader;
use tracing::{debug, info};

use crate::frame::{Frame, ShapeError};

const IMAGE_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

/// 读取并解码一张图像文件
pub fn load_frame(path: &Path) -> Result<Frame, ShapeError> {
  let image = ImageReader::open(path)
    .map_err(|source| ShapeError::Io {
      path: path.to_path_buf(),
      source,
    })?
    .decode()
    .map_err(|source| ShapeError::Decode {
      path: path.to_path_buf(),
      source,
    })?
    .to_rgb8();

  info!("读取图像文件: {}", path.display());
  Frame::new(path, image)
}

/// 源目录：摄像头写入，推理后删除，本质上是一个工作队列
#[derive(Debug, Clone)]
pub struct PendingImages {
  directory: PathBuf,
}

impl PendingImages {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 列出目录中的 JPEG 文件，按文件名排序（即拍摄时间顺序）
  pub fn scan(&self) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&self.directory)? {
      let entry = entry?;
      let path = entry.path();
      if !entry.file_type()?.is_file() {
        continue;
      }
      if is_image_file(&path) {
        files.push(path);
      }
    }
    files.sort();
    debug!(
      "目录 {} 中共有 {} 个待处理图像",
      self.directory.display(),
      files.len()
    );
    Ok(files)
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      IMAGE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
    })
    .unwrap_or(false)
}
