// 该文件是 Shaobing （哨兵） 项目的一部分。
// tests/pipeline.rs - 目录处理端到端测试
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

mod common;

use std::path::{Path, PathBuf};

use common::{ScriptedSession, write_jpeg};
use shaobing::{
  input::PendingImages,
  model::{ConfigurationError, DeviceError, InferenceSession},
  output::TriageDirectoryOutput,
  preprocess::ChannelOrder,
  task::{BatchOrchestrator, BatchPolicy, PassSummary, TaskError},
};
use tempfile::TempDir;

struct Workspace {
  _root: TempDir,
  source: PathBuf,
  positive: PathBuf,
  negative: PathBuf,
}

impl Workspace {
  fn new() -> Self {
    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("cameraImages");
    std::fs::create_dir_all(&source).unwrap();
    Self {
      positive: root.path().join("Detection"),
      negative: root.path().join("noDetection"),
      source,
      _root: root,
    }
  }

  fn output(&self) -> TriageDirectoryOutput {
    TriageDirectoryOutput::new(&self.positive, &self.negative).with_record(true)
  }

  fn orchestrator(
    &self,
    session: &ScriptedSession,
    policy: BatchPolicy,
  ) -> BatchOrchestrator<TriageDirectoryOutput> {
    BatchOrchestrator::new(session.layout(), ChannelOrder::Rgb, policy, self.output()).unwrap()
  }

  fn pending(&self) -> PendingImages {
    PendingImages::new(&self.source)
  }
}

fn names(dir: &Path) -> Vec<String> {
  let Ok(entries) = std::fs::read_dir(dir) else {
    return vec![];
  };
  let mut names: Vec<_> = entries
    .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}

#[test]
fn positive_image_is_annotated_and_source_removed() {
  let ws = Workspace::new();
  write_jpeg(&ws.source.join("240101120000.jpg"), 640, 480, 90);

  let mut session = ScriptedSession::new(1, &[1, 1, 2, 7]).reply(&[
    [0.0, 3.0, 0.62, 0.1, 0.1, 0.4, 0.4],
    [0.0, 5.0, 0.2, 0.5, 0.5, 0.9, 0.9],
  ]);
  let orchestrator = ws.orchestrator(&session, BatchPolicy::PerFile);
  let summary = orchestrator.run_pass(&mut session, &ws.pending()).unwrap();

  assert_eq!(
    summary,
    PassSummary {
      seen: 1,
      positives: 1,
      ..Default::default()
    }
  );
  assert!(names(&ws.source).is_empty());
  assert!(names(&ws.negative).is_empty());
  assert_eq!(
    names(&ws.positive),
    vec!["240101120000.jpg", "240101120000.json"]
  );

  let record: serde_json::Value = serde_json::from_str(
    &std::fs::read_to_string(ws.positive.join("240101120000.json")).unwrap(),
  )
  .unwrap();
  let detections = record["detections"].as_array().unwrap();
  assert_eq!(detections.len(), 1);
  assert_eq!(detections[0]["label"], 3);
  assert_eq!(detections[0]["box"], serde_json::json!([64, 48, 256, 192]));

  // 输入按网络尺寸缩放
  assert_eq!(session.received.len(), 1);
  assert_eq!(session.received[0].image.tensor.shape(), [1, 3, 300, 300]);
}

#[test]
fn negative_image_is_copied_unmodified() {
  let ws = Workspace::new();
  let source = ws.source.join("240101120001.jpg");
  write_jpeg(&source, 320, 240, 30);
  let original = std::fs::read(&source).unwrap();

  let mut session = ScriptedSession::new(1, &[1, 1, 3, 7]).reply(&[
    [0.0, 1.0, 0.0, 0.1, 0.1, 0.2, 0.2],
    [0.0, 1.0, -1.0, 0.1, 0.1, 0.2, 0.2],
    [0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0],
  ]);
  let orchestrator = ws.orchestrator(&session, BatchPolicy::PerFile);
  let summary = orchestrator.run_pass(&mut session, &ws.pending()).unwrap();

  assert_eq!(summary.negatives, 1);
  assert!(!source.exists());
  assert_eq!(
    std::fs::read(ws.negative.join("240101120001.jpg")).unwrap(),
    original
  );
  assert!(names(&ws.positive).is_empty());
}

#[test]
fn output_rank_three_fails_before_any_image() {
  let ws = Workspace::new();
  write_jpeg(&ws.source.join("a.jpg"), 10, 10, 0);
  let session = ScriptedSession::new(1, &[1, 100, 7]);

  let err = BatchOrchestrator::new(
    session.layout(),
    ChannelOrder::Rgb,
    BatchPolicy::PerFile,
    ws.output(),
  )
  .err()
  .unwrap();
  assert!(matches!(err, ConfigurationError::OutputRank { rank: 3, .. }));
  assert!(session.received.is_empty());
  assert_eq!(names(&ws.source), vec!["a.jpg"]);
}

#[test]
fn corrupt_image_is_skipped_and_left_in_place() {
  let ws = Workspace::new();
  std::fs::write(ws.source.join("a.jpg"), b"not a jpeg").unwrap();
  write_jpeg(&ws.source.join("b.jpg"), 64, 48, 200);
  std::fs::write(ws.source.join("notes.txt"), b"ignored").unwrap();

  let mut session = ScriptedSession::new(1, &[1, 1, 1, 7]);
  let orchestrator = ws.orchestrator(&session, BatchPolicy::PerFile);
  let summary = orchestrator.run_pass(&mut session, &ws.pending()).unwrap();

  assert_eq!(summary.seen, 2);
  assert_eq!(summary.skipped, 1);
  assert_eq!(summary.negatives, 1);
  assert_eq!(session.received.len(), 1);
  assert_eq!(names(&ws.source), vec!["a.jpg", "notes.txt"]);
  assert_eq!(names(&ws.negative), vec!["b.jpg"]);
}

#[test]
fn per_file_policy_pads_each_batch_with_the_same_image() {
  let ws = Workspace::new();
  write_jpeg(&ws.source.join("a.jpg"), 300, 300, 10);
  write_jpeg(&ws.source.join("b.jpg"), 300, 300, 250);

  let mut session = ScriptedSession::new(2, &[1, 1, 1, 7]);
  let orchestrator = ws.orchestrator(&session, BatchPolicy::PerFile);
  let summary = orchestrator.run_pass(&mut session, &ws.pending()).unwrap();

  assert_eq!(summary.negatives, 2);
  assert_eq!(session.received.len(), 2);
  for inputs in &session.received {
    let tensor = &inputs.image.tensor;
    assert_eq!(tensor.shape()[0], 2);
    assert_eq!(tensor.get(0, 0, 150, 150), tensor.get(1, 0, 150, 150));
  }
}

#[test]
fn fill_policy_packs_files_and_ignores_padding_detections() {
  let ws = Workspace::new();
  for name in ["a.jpg", "b.jpg", "c.jpg"] {
    write_jpeg(&ws.source.join(name), 300, 300, 128);
  }

  let mut session = ScriptedSession::new(2, &[1, 1, 2, 7])
    .reply(&[
      [1.0, 7.0, 0.9, 0.0, 0.0, 0.5, 0.5],
      [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    ])
    // 第二批只有一张真实图像，槽位 1 是补齐
    .reply(&[
      [1.0, 7.0, 0.9, 0.0, 0.0, 0.5, 0.5],
      [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    ]);
  let orchestrator = ws.orchestrator(&session, BatchPolicy::Fill);
  let summary = orchestrator.run_pass(&mut session, &ws.pending()).unwrap();

  assert_eq!(session.received.len(), 2);
  assert_eq!(summary.positives, 1);
  assert_eq!(summary.negatives, 2);
  assert_eq!(
    names(&ws.positive),
    vec!["b.jpg", "b.json"]
  );
  assert_eq!(names(&ws.negative), vec!["a.jpg", "c.jpg"]);
}

#[test]
fn out_of_range_rows_are_counted_not_fatal() {
  let ws = Workspace::new();
  write_jpeg(&ws.source.join("a.jpg"), 100, 200, 0);

  let mut session = ScriptedSession::new(1, &[1, 1, 2, 7]).reply(&[
    [4.0, 1.0, 0.9, 0.1, 0.1, 0.2, 0.2],
    [0.0, 1.0, 0.8, 0.1, 0.2, 0.5, 0.6],
  ]);
  let orchestrator = ws.orchestrator(&session, BatchPolicy::PerFile);
  let summary = orchestrator.run_pass(&mut session, &ws.pending()).unwrap();

  assert_eq!(summary.decode_errors, 1);
  assert_eq!(summary.positives, 1);
  let record: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(ws.positive.join("a.json")).unwrap()).unwrap();
  assert_eq!(
    record["detections"][0]["box"],
    serde_json::json!([10, 40, 50, 120])
  );
}

#[test]
fn device_failure_aborts_the_pass() {
  let ws = Workspace::new();
  write_jpeg(&ws.source.join("a.jpg"), 16, 16, 0);
  write_jpeg(&ws.source.join("b.jpg"), 16, 16, 0);

  let mut session =
    ScriptedSession::new(1, &[1, 1, 1, 7]).fail(DeviceError::Runtime("npu lost".into()));
  let orchestrator = ws.orchestrator(&session, BatchPolicy::PerFile);
  let err = orchestrator
    .run_pass(&mut session, &ws.pending())
    .unwrap_err();

  assert!(matches!(err, TaskError::Device(DeviceError::Runtime(_))));
  assert_eq!(session.received.len(), 1);
  assert_eq!(names(&ws.source), vec!["a.jpg", "b.jpg"]);
}

#[test]
fn write_failure_keeps_the_source() {
  let ws = Workspace::new();
  write_jpeg(&ws.source.join("a.jpg"), 16, 16, 0);
  // 阴性目录位置被普通文件占用
  std::fs::write(&ws.negative, b"").unwrap();

  let mut session = ScriptedSession::new(1, &[1, 1, 1, 7]);
  let orchestrator = ws.orchestrator(&session, BatchPolicy::PerFile);
  let summary = orchestrator.run_pass(&mut session, &ws.pending()).unwrap();

  assert_eq!(summary.write_failures, 1);
  assert_eq!(summary.negatives, 0);
  assert_eq!(names(&ws.source), vec!["a.jpg"]);
}

#[test]
fn existing_output_is_kept_and_source_retried_later() {
  let ws = Workspace::new();
  write_jpeg(&ws.source.join("a.jpg"), 16, 16, 0);
  std::fs::create_dir_all(&ws.negative).unwrap();
  std::fs::write(ws.negative.join("a.jpg"), b"earlier").unwrap();

  let mut session = ScriptedSession::new(1, &[1, 1, 1, 7]);
  let orchestrator = ws.orchestrator(&session, BatchPolicy::PerFile);
  let summary = orchestrator.run_pass(&mut session, &ws.pending()).unwrap();

  assert_eq!(summary.write_failures, 1);
  assert_eq!(names(&ws.source), vec!["a.jpg"]);
  assert_eq!(std::fs::read(ws.negative.join("a.jpg")).unwrap(), b"earlier");
}

#[test]
fn empty_directory_never_invokes_the_session() {
  let ws = Workspace::new();
  let mut session = ScriptedSession::new(1, &[1, 1, 1, 7]);
  let orchestrator = ws.orchestrator(&session, BatchPolicy::PerFile);
  let summary = orchestrator.run_pass(&mut session, &ws.pending()).unwrap();

  assert_eq!(summary, PassSummary::default());
  assert!(session.received.is_empty());
}
