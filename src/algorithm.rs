// 该文件是 Shanan （山南西风） 项目的一部分。
// src/algorithm.rs - 算法生命周期
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

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  engine::{Engine, Shape},
  frame::{ConvertError, Image, ImageConverter, PixelFormat},
  geometry::DetectBox,
  quant::QuantParam,
};

mod config;
mod fomo;
mod yolo;

pub use self::config::{AlgorithmConfig, ConfigError, FomoConfig, YoloConfig};
pub use self::fomo::Fomo;
pub use self::yolo::Yolo;

/// 预处理时从每个通道字节中减去的偏置
pub const INPUT_BIAS: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlgorithmType {
  Undefined = 0,
  Fomo = 1,
  Yolo = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlgorithmCategory {
  Undefined = 0,
  Detection = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorType {
  Camera = 1,
}

/// 算法的静态描述，用于在不运行的情况下挑选解码器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlgorithmInfo {
  pub kind: AlgorithmType,
  pub category: AlgorithmCategory,
  pub input_from: SensorType,
}

impl AlgorithmInfo {
  pub const FOMO: AlgorithmInfo = AlgorithmInfo {
    kind: AlgorithmType::Fomo,
    category: AlgorithmCategory::Detection,
    input_from: SensorType::Camera,
  };

  pub const YOLO: AlgorithmInfo = AlgorithmInfo {
    kind: AlgorithmType::Yolo,
    category: AlgorithmCategory::Detection,
    input_from: SensorType::Camera,
  };

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::json!({
      "type": self.kind as u8,
      "category": self.category as u8,
      "input_from": self.input_from as u8,
    })
  }
}

/// 所有已实现的算法
pub fn available_algorithms() -> &'static [AlgorithmInfo] {
  const ALGORITHMS: [AlgorithmInfo; 2] = [AlgorithmInfo::FOMO, AlgorithmInfo::YOLO];
  &ALGORITHMS
}

/// 根据引擎张量形状推断算法类型，依次尝试 YOLO、FOMO
pub fn algorithm_type_from_engine<E: Engine>(engine: &E) -> AlgorithmType {
  if Yolo::<E>::is_model_valid(engine) {
    AlgorithmType::Yolo
  } else if Fomo::<E>::is_model_valid(engine) {
    AlgorithmType::Fomo
  } else {
    AlgorithmType::Undefined
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmState {
  Uninitialized,
  Ready,
  Preprocessing,
  Inferring,
  Postprocessing,
  /// 后处理成功、结果已发布，`run` 返回前回到 `Ready`
  ResultsAvailable,
}

/// 三个阶段各自的耗时
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageTiming {
  pub preprocess: Duration,
  pub run: Duration,
  pub postprocess: Duration,
}

#[derive(Error, Debug)]
pub enum AlgorithmError {
  #[error("参数无效: {0}")]
  InvalidArgument(String),
  #[error("图像转换失败: {0}")]
  ConversionFailed(#[from] ConvertError),
  #[error("推理引擎错误: {0}")]
  EngineFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("量化参数无效: scale = {scale}")]
  InvalidQuantParam { scale: f32 },
  #[error("算法未初始化")]
  NotInitialized,
}

impl AlgorithmError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    AlgorithmError::InvalidArgument(msg.into())
  }

  pub fn engine<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    AlgorithmError::EngineFailure(Box::new(e))
  }
}

/// 解码器共享的状态：引擎、张量元数据、阶段计时
pub struct AlgorithmBase<E> {
  engine: E,
  converter: Box<dyn ImageConverter>,
  info: AlgorithmInfo,
  state: AlgorithmState,
  input_shape: Shape,
  output_shape: Shape,
  input_quant: QuantParam,
  output_quant: QuantParam,
  timing: StageTiming,
}

impl<E: Engine> AlgorithmBase<E> {
  pub fn new(engine: E, converter: Box<dyn ImageConverter>, info: AlgorithmInfo) -> Self {
    Self {
      engine,
      converter,
      info,
      state: AlgorithmState::Uninitialized,
      input_shape: Shape::default(),
      output_shape: Shape::default(),
      input_quant: QuantParam::default(),
      output_quant: QuantParam::default(),
      timing: StageTiming::default(),
    }
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn engine_mut(&mut self) -> &mut E {
    &mut self.engine
  }

  pub fn into_engine(self) -> E {
    self.engine
  }

  pub fn info(&self) -> AlgorithmInfo {
    self.info
  }

  pub fn state(&self) -> AlgorithmState {
    self.state
  }

  pub fn input_shape(&self) -> &Shape {
    &self.input_shape
  }

  pub fn output_shape(&self) -> &Shape {
    &self.output_shape
  }

  pub fn input_quant(&self) -> QuantParam {
    self.input_quant
  }

  pub fn output_quant(&self) -> QuantParam {
    self.output_quant
  }

  pub fn timing(&self) -> StageTiming {
    self.timing
  }

  /// 模型输入 (宽, 高)，NHWC 布局
  pub fn input_size(&self) -> (u16, u16) {
    (
      self.input_shape.dim(2) as u16,
      self.input_shape.dim(1) as u16,
    )
  }

  pub fn input_format(&self) -> Option<PixelFormat> {
    PixelFormat::from_channels(self.input_shape.dim(3))
  }

  /// 读取张量形状与量化参数，检查输入通道数
  pub fn bind(&mut self) -> Result<(), AlgorithmError> {
    let input_shape = self.engine.input_shape(0);
    let output_shape = self.engine.output_shape(0);

    if input_shape.rank() != 4 {
      error!("预期输入张量为 4 维, 实际为 {}", input_shape);
      return Err(AlgorithmError::invalid(format!(
        "预期输入张量为 4 维, 实际为 {}",
        input_shape
      )));
    }
    if PixelFormat::from_channels(input_shape[3]).is_none() {
      error!("不支持的输入通道数: {}", input_shape[3]);
      return Err(AlgorithmError::invalid(format!(
        "不支持的输入通道数: {}",
        input_shape[3]
      )));
    }
    if input_shape[1] == 0
      || input_shape[2] == 0
      || input_shape[1] > u16::MAX as usize
      || input_shape[2] > u16::MAX as usize
    {
      error!("输入尺寸无效: {}", input_shape);
      return Err(AlgorithmError::invalid(format!("输入尺寸无效: {}", input_shape)));
    }

    self.input_quant = self.engine.input_quant_param(0);
    self.output_quant = self.engine.output_quant_param(0);
    debug!(
      "输入 {} {:?}, 输出 {} {:?}",
      input_shape, self.input_quant, output_shape, self.output_quant
    );
    self.input_shape = input_shape;
    self.output_shape = output_shape;
    self.timing = StageTiming::default();
    self.state = AlgorithmState::Ready;
    Ok(())
  }

  pub fn unbind(&mut self) {
    self.state = AlgorithmState::Uninitialized;
  }

  /// 把源图像转换写入引擎输入张量，减去偏置，返回 (宽比例, 高比例)
  pub fn convert_into_input(&mut self, src: &Image<&[u8]>) -> Result<(f32, f32), AlgorithmError> {
    let (width, height) = self.input_size();
    let format = self.input_format().ok_or(AlgorithmError::NotInitialized)?;
    let size = width as usize * height as usize * self.input_shape.dim(3);

    let data = self.engine.input_mut(0);
    if data.len() < size {
      error!("输入张量过小: 期望 {}, 实际 {}", size, data.len());
      return Err(AlgorithmError::invalid(format!(
        "输入张量过小: 期望 {}, 实际 {}",
        size,
        data.len()
      )));
    }

    let mut dst = Image::new(&mut data[..size], width, height, format);
    self.converter.convert(src, &mut dst)?;

    for byte in dst.data.iter_mut() {
      *byte = byte.wrapping_sub(INPUT_BIAS);
    }

    Ok((
      src.width as f32 / width as f32,
      src.height as f32 / height as f32,
    ))
  }

  fn begin_cycle(&mut self) -> Result<(), AlgorithmError> {
    match self.state {
      AlgorithmState::Ready => {
        self.timing = StageTiming::default();
        self.state = AlgorithmState::Preprocessing;
        Ok(())
      }
      state => {
        error!("算法状态 {:?} 下无法运行", state);
        Err(AlgorithmError::NotInitialized)
      }
    }
  }

  /// 阶段失败时回到 `Ready`，上一轮结果不受影响
  fn settle<T>(&mut self, ret: Result<T, AlgorithmError>) -> Result<T, AlgorithmError> {
    if let Err(e) = &ret {
      error!("{:?} 阶段失败: {}", self.state, e);
      self.state = AlgorithmState::Ready;
    }
    ret
  }
}

/// 解码器
///
/// 具体解码器实现 `preprocess` 与 `postprocess`，`run` 依次执行
/// 预处理、推理、后处理并记录各阶段耗时。任何阶段失败都会跳过剩余阶段，
/// 已发布的结果保持不变。
pub trait Algorithm {
  type Engine: Engine;

  fn base(&self) -> &AlgorithmBase<Self::Engine>;
  fn base_mut(&mut self) -> &mut AlgorithmBase<Self::Engine>;

  fn init(&mut self) -> Result<(), AlgorithmError>;
  fn deinit(&mut self);

  fn preprocess(&mut self, input: &Image<&[u8]>) -> Result<(), AlgorithmError>;
  fn postprocess(&mut self) -> Result<(), AlgorithmError>;

  /// 按 x 升序排列，下一次 `run` 之前有效
  fn results(&self) -> &[DetectBox];

  fn info(&self) -> AlgorithmInfo {
    self.base().info()
  }

  fn state(&self) -> AlgorithmState {
    self.base().state()
  }

  fn timing(&self) -> StageTiming {
    self.base().timing()
  }

  /// 毫秒
  fn preprocess_time(&self) -> u32 {
    self.timing().preprocess.as_millis() as u32
  }

  fn run_time(&self) -> u32 {
    self.timing().run.as_millis() as u32
  }

  fn postprocess_time(&self) -> u32 {
    self.timing().postprocess.as_millis() as u32
  }

  fn run(&mut self, input: &Image<&[u8]>) -> Result<&[DetectBox], AlgorithmError> {
    self.base_mut().begin_cycle()?;

    let started = Instant::now();
    let ret = self.preprocess(input);
    self.base_mut().timing.preprocess = started.elapsed();
    self.base_mut().settle(ret)?;

    self.base_mut().state = AlgorithmState::Inferring;
    let started = Instant::now();
    let ret = self.base_mut().engine.run().map_err(AlgorithmError::engine);
    self.base_mut().timing.run = started.elapsed();
    self.base_mut().settle(ret)?;

    self.base_mut().state = AlgorithmState::Postprocessing;
    let started = Instant::now();
    let ret = self.postprocess();
    self.base_mut().timing.postprocess = started.elapsed();
    self.base_mut().settle(ret)?;

    let base = self.base_mut();
    base.state = AlgorithmState::ResultsAvailable;
    debug!(
      "{:?} 预处理: {:.2?}, 推理: {:.2?}, 后处理: {:.2?}",
      base.state, base.timing.preprocess, base.timing.run, base.timing.postprocess
    );
    base.state = AlgorithmState::Ready;

    Ok(self.results())
  }
}

/// 按配置选择的解码器
pub enum AlgorithmWrapper<E> {
  Fomo(Fomo<E>),
  Yolo(Yolo<E>),
}

impl<E: Engine> AlgorithmWrapper<E> {
  pub fn from_config(engine: E, converter: Box<dyn ImageConverter>, config: AlgorithmConfig) -> Self {
    info!("创建算法: {:?}", config);
    match config {
      AlgorithmConfig::Fomo(config) => {
        AlgorithmWrapper::Fomo(Fomo::with_config(engine, converter, config))
      }
      AlgorithmConfig::Yolo(config) => {
        AlgorithmWrapper::Yolo(Yolo::with_config(engine, converter, config))
      }
    }
  }

  /// 未给出配置时按引擎张量形状推断算法，使用默认阈值
  pub fn detect(
    engine: E,
    converter: Box<dyn ImageConverter>,
    config: Option<AlgorithmConfig>,
  ) -> Result<Self, AlgorithmError> {
    let config = match config {
      Some(config) => config,
      None => {
        let kind = algorithm_type_from_engine(&engine);
        info!("根据模型形状推断算法: {:?}", kind);
        AlgorithmConfig::default_for(kind).ok_or_else(|| {
          error!(
            "无法识别的模型: 输入 {}, 输出 {}",
            engine.input_shape(0),
            engine.output_shape(0)
          );
          AlgorithmError::invalid("无法根据输入输出形状识别模型")
        })?
      }
    };
    Ok(Self::from_config(engine, converter, config))
  }

  pub fn config(&self) -> AlgorithmConfig {
    match self {
      AlgorithmWrapper::Fomo(algo) => AlgorithmConfig::Fomo(algo.config()),
      AlgorithmWrapper::Yolo(algo) => AlgorithmConfig::Yolo(algo.config()),
    }
  }
}

impl<E: Engine> Algorithm for AlgorithmWrapper<E> {
  type Engine = E;

  fn base(&self) -> &AlgorithmBase<E> {
    match self {
      AlgorithmWrapper::Fomo(algo) => algo.base(),
      AlgorithmWrapper::Yolo(algo) => algo.base(),
    }
  }

  fn base_mut(&mut self) -> &mut AlgorithmBase<E> {
    match self {
      AlgorithmWrapper::Fomo(algo) => algo.base_mut(),
      AlgorithmWrapper::Yolo(algo) => algo.base_mut(),
    }
  }

  fn init(&mut self) -> Result<(), AlgorithmError> {
    match self {
      AlgorithmWrapper::Fomo(algo) => algo.init(),
      AlgorithmWrapper::Yolo(algo) => algo.init(),
    }
  }

  fn deinit(&mut self) {
    match self {
      AlgorithmWrapper::Fomo(algo) => algo.deinit(),
      AlgorithmWrapper::Yolo(algo) => algo.deinit(),
    }
  }

  fn preprocess(&mut self, input: &Image<&[u8]>) -> Result<(), AlgorithmError> {
    match self {
      AlgorithmWrapper::Fomo(algo) => algo.preprocess(input),
      AlgorithmWrapper::Yolo(algo) => algo.preprocess(input),
    }
  }

  fn postprocess(&mut self) -> Result<(), AlgorithmError> {
    match self {
      AlgorithmWrapper::Fomo(algo) => algo.postprocess(),
      AlgorithmWrapper::Yolo(algo) => algo.postprocess(),
    }
  }

  fn results(&self) -> &[DetectBox] {
    match self {
      AlgorithmWrapper::Fomo(algo) => algo.results(),
      AlgorithmWrapper::Yolo(algo) => algo.results(),
    }
  }
}
