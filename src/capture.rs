// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/capture.rs - 运动触发后的连拍
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

use std::{
  path::{Path, PathBuf},
  thread,
  time::Duration,
};

use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_SHOTS: usize = 2;
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const STILL_NAME_FORMAT: &str = "%y%m%d%H%M%S";

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("摄像头参数无效: {0}")]
  InvalidOption(String),
  #[error("I/O 错误 {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("摄像头错误: {0}")]
  Camera(String),
  #[error("图像编码错误 {path}: {source}")]
  Encode {
    path: PathBuf,
    source: image::ImageError,
  },
}

/// 拍摄一张静态图像并编码写入 `path`
pub trait StillCamera {
  type Error;
  fn capture_to(&mut self, path: &Path) -> Result<(), Self::Error>;
}

/// 拍摄文件名: `yymmddHHMMSS.jpg`
pub fn still_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
  Tz::Offset: std::fmt::Display,
{
  format!("{}.jpg", at.format(STILL_NAME_FORMAT))
}

/// 以固定间隔连续拍摄若干张图像到待处理目录
pub struct CaptureBurst<C> {
  camera: C,
  shots: usize,
  interval: Duration,
  directory: PathBuf,
  reserved: Vec<PathBuf>,
}

impl<C> CaptureBurst<C>
where
  C: StillCamera,
  CaptureError: From<C::Error>,
{
  pub fn new(camera: C, directory: impl Into<PathBuf>) -> Self {
    Self {
      camera,
      shots: DEFAULT_SHOTS,
      interval: DEFAULT_INTERVAL,
      directory: directory.into(),
      reserved: Vec::new(),
    }
  }

  /// 新文件名在这些目录（例如分拣输出目录）中同样不得已存在
  pub fn with_reserved_directories<P: Into<PathBuf>>(
    mut self,
    directories: impl IntoIterator<Item = P>,
  ) -> Self {
    self.reserved = directories.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_shots(mut self, shots: usize) -> Self {
    self.shots = shots;
    self
  }

  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn camera(&self) -> &C {
    &self.camera
  }

  /// 依次拍摄，返回写入的文件路径（按拍摄顺序）
  pub fn run(&mut self) -> Result<Vec<PathBuf>, CaptureError> {
    std::fs::create_dir_all(&self.directory).map_err(|source| CaptureError::Io {
      path: self.directory.clone(),
      source,
    })?;

    let mut captured = Vec::with_capacity(self.shots);
    for shot in 0..self.shots {
      if shot > 0 {
        thread::sleep(self.interval);
      }
      let path = self.vacant_path(&Local::now());
      let now = std::time::Instant::now();
      self.camera.capture_to(&path)?;
      info!(
        "第 {} 张图像拍摄完成: {}, 耗时: {:.2?}",
        shot + 1,
        path.display(),
        now.elapsed()
      );
      captured.push(path);
    }
    Ok(captured)
  }

  fn is_taken(&self, name: &str) -> bool {
    std::iter::once(&self.directory)
      .chain(&self.reserved)
      .any(|directory| directory.join(name).exists())
  }

  // 同一秒内多次拍摄时追加 `_kk`，保证按文件名排序即拍摄顺序
  fn vacant_path<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> PathBuf
  where
    Tz::Offset: std::fmt::Display,
  {
    let name = still_file_name(at);
    if !self.is_taken(&name) {
      return self.directory.join(name);
    }

    let stem = at.format(STILL_NAME_FORMAT).to_string();
    let mut k = 1;
    loop {
      let name = format!("{}_{:02}.jpg", stem, k);
      if !self.is_taken(&name) {
        debug!("文件名冲突, 使用 {}", name);
        return self.directory.join(name);
      }
      k += 1;
    }
  }
}

#[cfg(feature = "v4l_camera")]
mod v4l_camera;
#[cfg(feature = "v4l_camera")]
pub use self::v4l_camera::V4lStillCamera;
