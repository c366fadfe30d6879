// 该文件是 Shanan （山南西风） 项目的一部分。
// src/quant.rs - 量化参数与反量化
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

/// 张量的仿射量化参数：`real = (raw - zero_point) * scale`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParam {
  pub scale: f32,
  pub zero_point: i32,
}

impl Default for QuantParam {
  fn default() -> Self {
    Self {
      scale: 1.0,
      zero_point: 0,
    }
  }
}

impl QuantParam {
  pub fn new(scale: f32, zero_point: i32) -> Self {
    Self { scale, zero_point }
  }

  /// scale 必须为有限正数
  pub fn is_valid(&self) -> bool {
    self.scale.is_finite() && self.scale > 0.0
  }

  #[inline]
  pub fn dequantize(&self, raw: i8) -> f32 {
    (raw as i32 - self.zero_point) as f32 * self.scale
  }

  /// 反量化后乘以 100，并饱和到 `u8`（0-100 的置信度刻度）
  #[inline]
  pub fn dequantize_percent(&self, raw: i8) -> u8 {
    saturate_u8(self.dequantize(raw) * 100.0)
  }

  /// 反方向：把实数阈值映射回存储域，用于直接在原始 int8 上比较
  #[inline]
  pub fn quantize(&self, value: f32) -> i8 {
    let raw = (value / self.scale).round() as i32 + self.zero_point;
    raw.clamp(i8::MIN as i32, i8::MAX as i32) as i8
  }
}

/// 浮点数饱和转换到 `u8`，NaN 映射为 0
#[inline]
pub fn saturate_u8(value: f32) -> u8 {
  // `as` 对浮点到整数的转换本身就是饱和的
  value as u8
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dequantize_applies_zero_point_then_scale() {
    let q = QuantParam::new(0.5, -10);
    assert_eq!(q.dequantize(-10), 0.0);
    assert_eq!(q.dequantize(0), 5.0);
    assert_eq!(q.dequantize(-20), -5.0);
  }

  #[test]
  fn percent_saturates_into_u8() {
    let q = QuantParam::new(1.0 / 256.0, -128);
    assert_eq!(q.dequantize_percent(-128), 0);
    // (127 + 128) / 256 * 100 = 99.6
    assert_eq!(q.dequantize_percent(127), 99);

    let wide = QuantParam::new(0.1, 0);
    assert_eq!(wide.dequantize_percent(127), 255);
    assert_eq!(wide.dequantize_percent(-5), 0);
  }

  #[test]
  fn quantize_is_inverse_within_one_step() {
    let q = QuantParam::new(0.02, 3);
    for raw in [-128i8, -50, 0, 3, 64, 127] {
      let back = q.quantize(q.dequantize(raw));
      assert_eq!(back, raw);
    }
    assert_eq!(q.quantize(1000.0), i8::MAX);
    assert_eq!(q.quantize(-1000.0), i8::MIN);
  }

  #[test]
  fn non_positive_scale_is_invalid() {
    assert!(QuantParam::new(0.1, 0).is_valid());
    assert!(!QuantParam::new(0.0, 0).is_valid());
    assert!(!QuantParam::new(-0.5, 0).is_valid());
    assert!(!QuantParam::new(f32::NAN, 0).is_valid());
  }
}
