// 该文件是 Shanan （山南西风） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

//! 非极大值抑制
//!
//! 两两比较候选框，复杂度为 O(n²)。端侧模型每帧的候选数量在几十个量级，
//! 这个开销可以接受；候选数量上千时需要先做空间划分，这里没有实现。

use crate::geometry::{BoxFormat, DetectBox, iou};

/// NMS 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmsConfig {
  /// IoU 阈值，0-100
  pub iou_threshold: u8,
  /// 置信度阈值，0-100，分数不大于该值的框直接丢弃
  pub score_threshold: u8,
  /// 为真时跨类别抑制
  pub class_agnostic: bool,
  /// 输入框的坐标约定
  pub format: BoxFormat,
}

impl Default for NmsConfig {
  fn default() -> Self {
    Self {
      iou_threshold: 45,
      score_threshold: 0,
      class_agnostic: false,
      format: BoxFormat::Center,
    }
  }
}

impl NmsConfig {
  pub fn new(iou_threshold: u8, score_threshold: u8) -> Self {
    Self {
      iou_threshold,
      score_threshold,
      ..Default::default()
    }
  }

  pub fn class_agnostic(mut self, class_agnostic: bool) -> Self {
    self.class_agnostic = class_agnostic;
    self
  }

  pub fn format(mut self, format: BoxFormat) -> Self {
    self.format = format;
    self
  }
}

/// 按类别进行抑制，使用中心坐标约定
pub fn nms(boxes: &mut Vec<DetectBox>, iou_threshold: u8, score_threshold: u8) {
  nms_with(boxes, &NmsConfig::new(iou_threshold, score_threshold));
}

/// 原地删除冗余框
///
/// 按分数从高到低依次处理，只有保留下来的框才能抑制其他框：同一类别（或
/// `class_agnostic` 时任意两个）中 IoU 大于 `iou_threshold / 100` 的低分框被删除。
/// 分数相同时先插入的框优先。剩余框保持原有的相对顺序。
pub fn nms_with(boxes: &mut Vec<DetectBox>, config: &NmsConfig) {
  boxes.retain(|b| b.score > config.score_threshold);

  let threshold = config.iou_threshold as f32 / 100.0;
  let mut order: Vec<usize> = (0..boxes.len()).collect();
  // 稳定排序，同分时保持插入顺序
  order.sort_by(|&a, &b| boxes[b].score.cmp(&boxes[a].score));

  let mut keep = vec![true; boxes.len()];
  for (rank, &i) in order.iter().enumerate() {
    if !keep[i] {
      continue;
    }
    let best = &boxes[i];
    for &j in &order[rank + 1..] {
      let other = &boxes[j];
      if keep[j]
        && (config.class_agnostic || best.target == other.target)
        && iou(best, other, config.format) > threshold
      {
        keep[j] = false;
      }
    }
  }

  let mut index = 0;
  boxes.retain(|_| {
    let kept = keep[index];
    index += 1;
    kept
  });
}
