// 该文件是 Shanan （山南西风） 项目的一部分。
// src/geometry.rs - 检测框与交并比
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

use serde_json::{Value, json};

/// 检测结果
///
/// `x`、`y` 为框的中心坐标，`w`、`h` 为宽高，单位均为像素。
#[doc(alias = "Box")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectBox {
  /// 中心点 x 坐标
  pub x: u16,
  /// 中心点 y 坐标
  pub y: u16,
  /// 宽度
  pub w: u16,
  /// 高度
  pub h: u16,
  /// 置信度，0-100
  pub score: u8,
  /// 类别索引
  pub target: u8,
}

/// 坐标约定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxFormat {
  /// (cx, cy, w, h)
  #[default]
  Center,
  /// (x_min, y_min, w, h)
  Corner,
}

impl DetectBox {
  pub fn new(x: u16, y: u16, w: u16, h: u16, score: u8, target: u8) -> Self {
    Self {
      x,
      y,
      w,
      h,
      score,
      target,
    }
  }

  pub fn area(&self) -> f32 {
    self.w as f32 * self.h as f32
  }

  /// 返回 [x_min, y_min, x_max, y_max]
  pub fn to_xyxy(&self, format: BoxFormat) -> [f32; 4] {
    let (x, y, w, h) = (self.x as f32, self.y as f32, self.w as f32, self.h as f32);
    match format {
      BoxFormat::Center => [x - w / 2.0, y - h / 2.0, x + w / 2.0, y + h / 2.0],
      BoxFormat::Corner => [x, y, x + w, y + h],
    }
  }

  /// 中心坐标约定下的交并比
  pub fn iou(&self, other: &DetectBox) -> f32 {
    iou(self, other, BoxFormat::Center)
  }

  /// 按 `{"x", "y", "w", "h", "target", "score"}` 渲染
  pub fn to_json(&self) -> Value {
    json!({
      "x": self.x,
      "y": self.y,
      "w": self.w,
      "h": self.h,
      "target": self.target,
      "score": self.score,
    })
  }
}

/// 计算两个边界框的 IoU
pub fn iou(a: &DetectBox, b: &DetectBox, format: BoxFormat) -> f32 {
  let [ax1, ay1, ax2, ay2] = a.to_xyxy(format);
  let [bx1, by1, bx2, by2] = b.to_xyxy(format);

  let x1 = ax1.max(bx1);
  let y1 = ay1.max(by1);
  let x2 = ax2.min(bx2);
  let y2 = ay2.min(by2);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 把一组检测结果渲染为 JSON 数组
pub fn boxes_to_json(boxes: &[DetectBox]) -> Value {
  Value::Array(boxes.iter().map(DetectBox::to_json).collect())
}
