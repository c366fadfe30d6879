// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine/replay.rs - 回放推理结果的引擎
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, engine::{Engine, Shape}, quant::QuantParam};

#[derive(Error, Debug)]
pub enum ReplayEngineError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("参数 {0} 无效: {1}")]
  InvalidQuery(String, String),
  #[error("缺少参数: {0}")]
  MissingQuery(&'static str),
  #[error("输出张量大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  SizeMismatch { expected: usize, actual: usize },
}

/// 从文件回放 int8 输出张量的引擎
///
/// 每次 `run` 重新读取文件，输入张量只作为预处理的写入目标。
/// 在没有加速器的主机上用采集到的输出验证解码器。
pub struct ReplayEngine {
  path: PathBuf,
  input_shape: Shape,
  output_shape: Shape,
  input_quant: QuantParam,
  output_quant: QuantParam,
  input: Vec<u8>,
  output: Vec<i8>,
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "replay";
}

fn parse_shape(key: &str, value: &str) -> Result<Shape, ReplayEngineError> {
  value
    .split(',')
    .map(|d| d.trim().parse::<usize>())
    .collect::<Result<Vec<_>, _>>()
    .map(Shape::new)
    .map_err(|e| ReplayEngineError::InvalidQuery(key.to_string(), e.to_string()))
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ReplayEngineError>
where
  T::Err: std::fmt::Display,
{
  value
    .parse::<T>()
    .map_err(|e| ReplayEngineError::InvalidQuery(key.to_string(), e.to_string()))
}

impl FromUrl for ReplayEngine {
  type Error = ReplayEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayEngineError::SchemeMismatch);
    }

    let mut input_shape = None;
    let mut output_shape = None;
    let mut input_quant = QuantParam::default();
    let mut output_quant = QuantParam::default();

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "input" => input_shape = Some(parse_shape(&k, &v)?),
        "output" => output_shape = Some(parse_shape(&k, &v)?),
        "scale" => output_quant.scale = parse_value(&k, &v)?,
        "zero_point" => output_quant.zero_point = parse_value(&k, &v)?,
        "input_scale" => input_quant.scale = parse_value(&k, &v)?,
        "input_zero_point" => input_quant.zero_point = parse_value(&k, &v)?,
        _ => debug!("忽略未知参数: {}={}", k, v),
      }
    }

    let input_shape = input_shape.ok_or(ReplayEngineError::MissingQuery("input"))?;
    let output_shape = output_shape.ok_or(ReplayEngineError::MissingQuery("output"))?;

    Ok(Self::new(
      url.path(),
      input_shape,
      output_shape,
      input_quant,
      output_quant,
    ))
  }
}

impl ReplayEngine {
  pub fn new(
    path: impl Into<PathBuf>,
    input_shape: Shape,
    output_shape: Shape,
    input_quant: QuantParam,
    output_quant: QuantParam,
  ) -> Self {
    let path = path.into();
    info!(
      "回放引擎: {}, 输入 {}, 输出 {}",
      path.display(),
      input_shape,
      output_shape
    );
    Self {
      path,
      input: vec![0u8; input_shape.element_count()],
      output: vec![0i8; output_shape.element_count()],
      input_shape,
      output_shape,
      input_quant,
      output_quant,
    }
  }
}

impl Engine for ReplayEngine {
  type Error = ReplayEngineError;

  fn input_shape(&self, index: usize) -> Shape {
    if index == 0 {
      self.input_shape.clone()
    } else {
      Shape::default()
    }
  }

  fn output_shape(&self, index: usize) -> Shape {
    if index == 0 {
      self.output_shape.clone()
    } else {
      Shape::default()
    }
  }

  fn input_quant_param(&self, _index: usize) -> QuantParam {
    self.input_quant
  }

  fn output_quant_param(&self, _index: usize) -> QuantParam {
    self.output_quant
  }

  fn input_mut(&mut self, index: usize) -> &mut [u8] {
    if index == 0 { &mut self.input[..] } else { &mut [] }
  }

  fn output(&self, index: usize) -> &[i8] {
    if index == 0 { &self.output[..] } else { &[] }
  }

  fn run(&mut self) -> Result<(), Self::Error> {
    let data = std::fs::read(&self.path)?;
    if data.len() != self.output.len() {
      error!(
        "输出张量大小不匹配: 期望 {}, 实际 {}",
        self.output.len(),
        data.len()
      );
      return Err(ReplayEngineError::SizeMismatch {
        expected: self.output.len(),
        actual: data.len(),
      });
    }

    for (dst, src) in self.output.iter_mut().zip(data) {
      *dst = src as i8;
    }
    debug!("已回放 {} 字节输出", self.output.len());
    Ok(())
  }
}
