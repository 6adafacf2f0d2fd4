// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/trigger.rs - 运动传感器触发
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
  sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
  time::Duration,
};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decoded_path};

const GPIO_SYSFS_ROOT: &str = "/sys/class/gpio";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
  Motion,
  Cancelled,
}

#[derive(Error, Debug)]
pub enum TriggerError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("GPIO 引脚无效: {0}")]
  InvalidPin(String),
  #[error("GPIO I/O 错误 {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("GPIO 取值无效 {path}: {value:?}")]
  InvalidValue { path: PathBuf, value: String },
}

/// 阻塞等待运动事件。取消信号只在等待期间被检查。
pub trait MotionTrigger {
  type Error;
  fn wait_for_motion(&mut self, cancel: &Receiver<()>) -> Result<WaitOutcome, Self::Error>;
}

/// 通过 sysfs 读取的 PIR 人体红外传感器，高电平表示检测到运动
#[derive(Debug, Clone)]
pub struct GpioMotionSensor {
  pin: Option<u32>,
  value_path: PathBuf,
  poll_interval: Duration,
}

impl FromUrlWithScheme for GpioMotionSensor {
  const SCHEME: &'static str = "gpio";
}

impl FromUrl for GpioMotionSensor {
  type Error = TriggerError;

  /// `gpio://4?poll_ms=50` 或 `gpio:///sys/class/gpio/gpio4/value`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TriggerError::SchemeMismatch);
    }

    let mut sensor = match url.host_str().filter(|host| !host.is_empty()) {
      Some(pin) => {
        let pin: u32 = pin
          .parse()
          .map_err(|_| TriggerError::InvalidPin(pin.to_string()))?;
        Self::with_pin(pin)
      }
      None => Self::with_value_path(decoded_path(url)),
    };

    for (key, value) in url.query_pairs() {
      if key == "poll_ms" {
        let millis: u64 = value
          .parse()
          .map_err(|_| TriggerError::InvalidPin(format!("poll_ms={}", value)))?;
        sensor.poll_interval = Duration::from_millis(millis.max(1));
      }
    }

    Ok(sensor)
  }
}

impl GpioMotionSensor {
  pub fn with_pin(pin: u32) -> Self {
    Self {
      pin: Some(pin),
      value_path: Path::new(GPIO_SYSFS_ROOT)
        .join(format!("gpio{}", pin))
        .join("value"),
      poll_interval: DEFAULT_POLL_INTERVAL,
    }
  }

  pub fn with_value_path(path: impl Into<PathBuf>) -> Self {
    Self {
      pin: None,
      value_path: path.into(),
      poll_interval: DEFAULT_POLL_INTERVAL,
    }
  }

  pub fn with_poll_interval(mut self, interval: Duration) -> Self {
    self.poll_interval = interval;
    self
  }

  pub fn value_path(&self) -> &Path {
    &self.value_path
  }

  pub fn poll_interval(&self) -> Duration {
    self.poll_interval
  }

  fn ensure_exported(&self) -> Result<(), TriggerError> {
    let Some(pin) = self.pin else {
      return Ok(());
    };
    if self.value_path.exists() {
      return Ok(());
    }

    info!("导出 GPIO 引脚 {}", pin);
    let root = Path::new(GPIO_SYSFS_ROOT);
    write_sysfs(&root.join("export"), &pin.to_string())?;
    write_sysfs(&root.join(format!("gpio{}", pin)).join("direction"), "in")
  }

  fn is_active(&self) -> Result<bool, TriggerError> {
    let raw = std::fs::read_to_string(&self.value_path).map_err(|source| TriggerError::Io {
      path: self.value_path.clone(),
      source,
    })?;
    match raw.trim() {
      "1" => Ok(true),
      "0" => Ok(false),
      other => Err(TriggerError::InvalidValue {
        path: self.value_path.clone(),
        value: other.to_string(),
      }),
    }
  }
}

fn write_sysfs(path: &Path, value: &str) -> Result<(), TriggerError> {
  std::fs::write(path, value).map_err(|source| TriggerError::Io {
    path: path.to_path_buf(),
    source,
  })
}

impl MotionTrigger for GpioMotionSensor {
  type Error = TriggerError;

  fn wait_for_motion(&mut self, cancel: &Receiver<()>) -> Result<WaitOutcome, Self::Error> {
    self.ensure_exported()?;
    debug!("等待运动事件: {}", self.value_path.display());

    loop {
      // 传感器持续高电平时也要先响应取消
      match cancel.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => return Ok(WaitOutcome::Cancelled),
        Err(TryRecvError::Empty) => {}
      }
      if self.is_active()? {
        info!("检测到运动");
        return Ok(WaitOutcome::Motion);
      }
      // 发送端被丢弃同样视为取消
      match cancel.recv_timeout(self.poll_interval) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(WaitOutcome::Cancelled),
        Err(RecvTimeoutError::Timeout) => {}
      }
    }
  }
}
