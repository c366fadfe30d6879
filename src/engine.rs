// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine.rs - 推理引擎接口
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

use std::ops::Index;

use crate::quant::QuantParam;

mod replay;
pub use self::replay::{ReplayEngine, ReplayEngineError};

/// 张量形状，按维度顺序排列
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Shape {
  dims: Vec<usize>,
}

impl Shape {
  pub fn new(dims: impl Into<Vec<usize>>) -> Self {
    Self { dims: dims.into() }
  }

  pub fn rank(&self) -> usize {
    self.dims.len()
  }

  pub fn dims(&self) -> &[usize] {
    &self.dims
  }

  /// 越界时返回 0
  pub fn dim(&self, axis: usize) -> usize {
    self.dims.get(axis).copied().unwrap_or(0)
  }

  pub fn element_count(&self) -> usize {
    if self.dims.is_empty() {
      0
    } else {
      self.dims.iter().product()
    }
  }
}

impl Index<usize> for Shape {
  type Output = usize;

  fn index(&self, axis: usize) -> &Self::Output {
    &self.dims[axis]
  }
}

impl From<&[usize]> for Shape {
  fn from(dims: &[usize]) -> Self {
    Self::new(dims.to_vec())
  }
}

impl<const N: usize> From<[usize; N]> for Shape {
  fn from(dims: [usize; N]) -> Self {
    Self::new(dims.to_vec())
  }
}

impl std::fmt::Display for Shape {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[")?;
    for (i, d) in self.dims.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", d)?;
    }
    write!(f, "]")
  }
}

/// 推理引擎
///
/// 解码器只通过这个接口读写张量：输入张量是量化模型期望的像素字节，
/// 输出张量是 int8 量化结果。张量索引不存在时，形状返回空形状。
pub trait Engine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn input_shape(&self, index: usize) -> Shape;
  fn output_shape(&self, index: usize) -> Shape;
  fn input_quant_param(&self, index: usize) -> QuantParam;
  fn output_quant_param(&self, index: usize) -> QuantParam;

  /// 输入张量内存，预处理直接写入
  fn input_mut(&mut self, index: usize) -> &mut [u8];
  fn output(&self, index: usize) -> &[i8];

  fn run(&mut self) -> Result<(), Self::Error>;
}

impl<E: Engine + ?Sized> Engine for &mut E {
  type Error = E::Error;

  fn input_shape(&self, index: usize) -> Shape {
    (**self).input_shape(index)
  }

  fn output_shape(&self, index: usize) -> Shape {
    (**self).output_shape(index)
  }

  fn input_quant_param(&self, index: usize) -> QuantParam {
    (**self).input_quant_param(index)
  }

  fn output_quant_param(&self, index: usize) -> QuantParam {
    (**self).output_quant_param(index)
  }

  fn input_mut(&mut self, index: usize) -> &mut [u8] {
    (**self).input_mut(index)
  }

  fn output(&self, index: usize) -> &[i8] {
    (**self).output(index)
  }

  fn run(&mut self) -> Result<(), Self::Error> {
    (**self).run()
  }
}
