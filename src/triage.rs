// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/triage.rs - 检测结果分拣
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

use tracing::info;

use crate::decoder::{DetectionProposal, PixelBox};

/// 置信度严格大于该值的检测才会使图像被判为阳性。
/// 与解码阶段的有效行阈值是两个不同的门限。
pub const POSITIVE_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum TriageOutcome {
  /// 所有达标检测，按输出顺序排列，不做 NMS
  Positive {
    boxes: Vec<PixelBox>,
    labels: Vec<i32>,
    scores: Vec<f32>,
  },
  Negative,
}

impl TriageOutcome {
  pub fn is_positive(&self) -> bool {
    matches!(self, TriageOutcome::Positive { .. })
  }

  fn accept(&mut self, proposal: &DetectionProposal) {
    match self {
      TriageOutcome::Negative => {
        *self = TriageOutcome::Positive {
          boxes: vec![proposal.pixels],
          labels: vec![proposal.label],
          scores: vec![proposal.confidence],
        };
      }
      TriageOutcome::Positive {
        boxes,
        labels,
        scores,
      } => {
        boxes.push(proposal.pixels);
        labels.push(proposal.label);
        scores.push(proposal.confidence);
      }
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Triage;

impl Triage {
  /// 对批次中前 `units` 个槽位逐一分类；补齐槽位上的检测被忽略
  pub fn classify(&self, proposals: &[DetectionProposal], units: usize) -> Vec<TriageOutcome> {
    let mut outcomes = vec![TriageOutcome::Negative; units];

    for proposal in proposals {
      if proposal.confidence <= POSITIVE_CONFIDENCE {
        continue;
      }
      if let Some(outcome) = outcomes.get_mut(proposal.image_index) {
        info!(
          "第 {} 行检测 (类别 {}, prob = {:.6}) 将被绘制到第 {} 张图像",
          proposal.row, proposal.label, proposal.confidence, proposal.image_index
        );
        outcome.accept(proposal);
      }
    }

    outcomes
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decoder::NormalizedBox;

  fn proposal(row: usize, image_index: usize, label: i32, confidence: f32) -> DetectionProposal {
    let pixels = PixelBox {
      xmin: row as u32,
      ymin: row as u32,
      xmax: row as u32 + 10,
      ymax: row as u32 + 10,
    };
    DetectionProposal {
      row,
      image_index,
      label,
      confidence,
      bbox: NormalizedBox {
        xmin: 0.0,
        ymin: 0.0,
        xmax: 0.0,
        ymax: 0.0,
      },
      pixels,
    }
  }

  #[test]
  fn low_confidence_never_makes_positive() {
    let proposals = [proposal(0, 0, 1, 0.5), proposal(1, 0, 2, 0.01)];
    assert_eq!(
      Triage.classify(&proposals, 1),
      vec![TriageOutcome::Negative]
    );
  }

  #[test]
  fn all_qualifying_boxes_are_kept_in_order() {
    let proposals = [
      proposal(0, 0, 3, 0.9),
      proposal(1, 1, 4, 0.4),
      proposal(2, 0, 3, 0.51),
      proposal(3, 1, 8, 0.75),
    ];
    let outcomes = Triage.classify(&proposals, 2);
    match &outcomes[0] {
      TriageOutcome::Positive {
        boxes,
        labels,
        scores,
      } => {
        assert_eq!(labels, &vec![3, 3]);
        assert_eq!(scores, &vec![0.9, 0.51]);
        assert_eq!(boxes[1].xmin, 2);
      }
      TriageOutcome::Negative => panic!("image 0 should be positive"),
    }
    match &outcomes[1] {
      TriageOutcome::Positive { labels, .. } => assert_eq!(labels, &vec![8]),
      TriageOutcome::Negative => panic!("image 1 should be positive"),
    }
  }

  #[test]
  fn padding_slots_are_ignored() {
    let proposals = [proposal(0, 1, 3, 0.9)];
    let outcomes = Triage.classify(&proposals, 1);
    assert_eq!(outcomes, vec![TriageOutcome::Negative]);
  }
}
