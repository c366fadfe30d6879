// 该文件是 Shanan （山南西风） 项目的一部分。
// src/testing.rs - 测试用的引擎与转换器
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

//! 测试替身
//!
//! 单元测试直接使用；集成测试通过 `testing` 特性引入。

use std::time::Duration;

use thiserror::Error;

use crate::{
  engine::{Engine, Shape},
  frame::{ConvertError, Image, ImageConverter},
  quant::QuantParam,
};

#[derive(Error, Debug)]
#[error("mock engine failure")]
pub struct MockEngineError;

/// `run` 时把 `next_output` 拷贝到输出张量
pub struct MockEngine {
  pub input_shape: Shape,
  pub output_shape: Shape,
  pub input_quant: QuantParam,
  pub output_quant: QuantParam,
  pub input: Vec<u8>,
  pub output: Vec<i8>,
  pub next_output: Vec<i8>,
  pub fail: bool,
  pub runs: usize,
}

impl MockEngine {
  pub fn new(input: impl Into<Shape>, output: impl Into<Shape>, quant: QuantParam) -> Self {
    let input_shape = input.into();
    let output_shape = output.into();
    Self {
      input: vec![0; input_shape.element_count()],
      output: vec![0; output_shape.element_count()],
      next_output: vec![0; output_shape.element_count()],
      input_shape,
      output_shape,
      input_quant: QuantParam::default(),
      output_quant: quant,
      fail: false,
      runs: 0,
    }
  }
}

impl Engine for MockEngine {
  type Error = MockEngineError;

  fn input_shape(&self, _index: usize) -> Shape {
    self.input_shape.clone()
  }

  fn output_shape(&self, _index: usize) -> Shape {
    self.output_shape.clone()
  }

  fn input_quant_param(&self, _index: usize) -> QuantParam {
    self.input_quant
  }

  fn output_quant_param(&self, _index: usize) -> QuantParam {
    self.output_quant
  }

  fn input_mut(&mut self, _index: usize) -> &mut [u8] {
    &mut self.input
  }

  fn output(&self, _index: usize) -> &[i8] {
    &self.output
  }

  fn run(&mut self) -> Result<(), Self::Error> {
    if self.fail {
      return Err(MockEngineError);
    }
    self.runs += 1;
    self.output.clone_from(&self.next_output);
    Ok(())
  }
}

/// 用固定值填满目标图像，空源图像视为转换失败
pub struct FillConverter {
  pub value: u8,
  pub delay: Duration,
}

impl FillConverter {
  pub fn new(value: u8) -> Self {
    Self {
      value,
      delay: Duration::ZERO,
    }
  }

  pub fn boxed(value: u8) -> Box<dyn ImageConverter> {
    Box::new(Self::new(value))
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }
}

impl ImageConverter for FillConverter {
  fn convert(&self, src: &Image<&[u8]>, dst: &mut Image<&mut [u8]>) -> Result<(), ConvertError> {
    if src.data.is_empty() {
      return Err(ConvertError::InvalidDimension(src.width, src.height));
    }
    if !self.delay.is_zero() {
      std::thread::sleep(self.delay);
    }
    dst.data.fill(self.value);
    Ok(())
  }
}

pub fn frame(width: u16, height: u16) -> Image<Vec<u8>> {
  Image::new(
    vec![0u8; width as usize * height as usize * 3],
    width,
    height,
    crate::frame::PixelFormat::Rgb888,
  )
}
