// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/output/directory_record.rs - 阳性/阴性目录输出
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

use serde_json::json;
use tracing::info;

use crate::{
  decoder::PixelBox,
  frame::Frame,
  output::{OutputError, Render, draw::Draw},
  triage::TriageOutcome,
};

/// 阳性图像绘制检测框后写入 `positive_dir`，阴性图像原样复制到 `negative_dir`。
/// 输出文件与源文件同名，已存在的同名文件不会被覆盖。
pub struct TriageDirectoryOutput {
  positive_dir: PathBuf,
  negative_dir: PathBuf,
  draw: Draw,
  record: bool,
}

impl TriageDirectoryOutput {
  pub fn new(positive_dir: impl Into<PathBuf>, negative_dir: impl Into<PathBuf>) -> Self {
    Self {
      positive_dir: positive_dir.into(),
      negative_dir: negative_dir.into(),
      draw: Draw::default(),
      record: false,
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  /// 同时为阳性图像写一份 JSON 检测记录
  pub fn with_record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  pub fn positive_dir(&self) -> &Path {
    &self.positive_dir
  }

  pub fn negative_dir(&self) -> &Path {
    &self.negative_dir
  }

  fn target(directory: &Path, frame: &Frame) -> Result<PathBuf, OutputError> {
    std::fs::create_dir_all(directory).map_err(|source| OutputError::Io {
      path: directory.to_path_buf(),
      source,
    })?;
    let path = directory.join(frame.file_name());
    if path.exists() {
      return Err(OutputError::Exists(path));
    }
    Ok(path)
  }
}

impl Render<Frame, TriageOutcome> for TriageDirectoryOutput {
  type Error = OutputError;

  fn render_result(&self, frame: &Frame, result: &TriageOutcome) -> Result<PathBuf, Self::Error> {
    match result {
      TriageOutcome::Positive {
        boxes,
        labels,
        scores,
      } => {
        let path = Self::target(&self.positive_dir, frame)?;
        let image = self.draw.annotate(frame.image(), boxes);
        image.save(&path).map_err(|source| OutputError::Image {
          path: path.clone(),
          source,
        })?;
        if self.record {
          write_record(&path, boxes, labels, scores)?;
        }
        info!("阳性检测图像已生成: {}", path.display());
        Ok(path)
      }
      TriageOutcome::Negative => {
        let path = Self::target(&self.negative_dir, frame)?;
        std::fs::copy(frame.path(), &path).map_err(|source| OutputError::Io {
          path: path.clone(),
          source,
        })?;
        info!("阴性检测图像已生成: {}", path.display());
        Ok(path)
      }
    }
  }
}

fn write_record(
  image_path: &Path,
  boxes: &[PixelBox],
  labels: &[i32],
  scores: &[f32],
) -> Result<(), OutputError> {
  let detections: Vec<_> = boxes
    .iter()
    .zip(labels)
    .zip(scores)
    .map(|((bbox, label), score)| {
      json!({
        "label": label,
        "score": score,
        "box": [bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax],
      })
    })
    .collect();
  let record = json!({
    "image": image_path.file_name().map(|name| name.to_string_lossy().into_owned()),
    "detections": detections,
  });

  let path = image_path.with_extension("json");
  std::fs::write(&path, record.to_string()).map_err(|source| OutputError::Io { path, source })
}
