// 该文件是 Shanan （山南西风） 项目的一部分。
// src/algorithm/fomo.rs - FOMO 热力图解码
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

use tracing::{debug, error};

use crate::{
  algorithm::{Algorithm, AlgorithmBase, AlgorithmError, AlgorithmInfo, FomoConfig},
  engine::Engine,
  frame::{Image, ImageConverter},
  geometry::DetectBox,
};

/// 目标类别数上限，类别序号需放进 `u8`
const FOMO_MAX_TARGETS: usize = 256;

/// 网格热力图解码器
///
/// 输出张量为 `[1, grid_h, grid_w, num_targets]`，类别 0 为背景。
/// 每个网格单元最多产生一个框，框的中心在单元中心，宽高等于单元大小，
/// 坐标位于模型输入空间。
pub struct Fomo<E> {
  base: AlgorithmBase<E>,
  config: FomoConfig,
  w_scale: f32,
  h_scale: f32,
  results: Vec<DetectBox>,
  candidates: Vec<DetectBox>,
}

impl<E: Engine> Fomo<E> {
  pub fn new(engine: E, converter: Box<dyn ImageConverter>) -> Self {
    Self::with_config(engine, converter, FomoConfig::default())
  }

  pub fn with_config(engine: E, converter: Box<dyn ImageConverter>, config: FomoConfig) -> Self {
    Self {
      base: AlgorithmBase::new(engine, converter, AlgorithmInfo::FOMO),
      config,
      w_scale: 1.0,
      h_scale: 1.0,
      results: Vec::new(),
      candidates: Vec::new(),
    }
  }

  /// 只检查张量形状，不运行推理
  pub fn is_model_valid(engine: &E) -> bool {
    let input = engine.input_shape(0);
    let output = engine.output_shape(0);

    if input.rank() != 4 || output.rank() != 4 {
      return false;
    }
    let (height, width, channels) = (input[1], input[2], input[3]);
    if input[0] != 1 || height == 0 || width == 0 || !matches!(channels, 1 | 3) {
      return false;
    }

    let (grid_h, grid_w, targets) = (output[1], output[2], output[3]);
    output[0] == 1
      && grid_h > 0
      && grid_w > 0
      && grid_h <= height
      && grid_w <= width
      && (2..=FOMO_MAX_TARGETS).contains(&targets)
  }

  pub fn config(&self) -> FomoConfig {
    self.config
  }

  pub fn set_config(&mut self, config: FomoConfig) {
    self.config = config;
  }

  pub fn score_threshold(&self) -> u8 {
    self.config.score_threshold
  }

  pub fn set_score_threshold(&mut self, threshold: u8) {
    self.config.score_threshold = threshold;
  }

  /// 最近一次预处理记录的 (源宽 / 模型宽, 源高 / 模型高)
  pub fn scale_factors(&self) -> (f32, f32) {
    (self.w_scale, self.h_scale)
  }
}

impl<E: Engine> Algorithm for Fomo<E> {
  type Engine = E;

  fn base(&self) -> &AlgorithmBase<E> {
    &self.base
  }

  fn base_mut(&mut self) -> &mut AlgorithmBase<E> {
    &mut self.base
  }

  fn init(&mut self) -> Result<(), AlgorithmError> {
    self.base.bind()?;

    if !Self::is_model_valid(self.base.engine()) {
      let shape = self.base.output_shape().clone();
      self.base.unbind();
      error!("FOMO 输出张量形状无效: {}", shape);
      return Err(AlgorithmError::invalid(format!(
        "FOMO 输出张量形状无效: {}",
        shape
      )));
    }

    let shape = self.base.output_shape();
    let cells = shape.dim(1) * shape.dim(2);
    self.results.clear();
    self.candidates.clear();
    self.results.reserve(cells);
    self.candidates.reserve(cells);
    debug!("FOMO 初始化完成, 网格 {}", shape);
    Ok(())
  }

  fn deinit(&mut self) {
    self.results = Vec::new();
    self.candidates = Vec::new();
    self.base.unbind();
  }

  fn preprocess(&mut self, input: &Image<&[u8]>) -> Result<(), AlgorithmError> {
    let (w_scale, h_scale) = self.base.convert_into_input(input)?;
    self.w_scale = w_scale;
    self.h_scale = h_scale;
    Ok(())
  }

  fn postprocess(&mut self) -> Result<(), AlgorithmError> {
    let quant = self.base.output_quant();
    if !quant.is_valid() {
      error!("输出量化参数无效: {:?}", quant);
      return Err(AlgorithmError::InvalidQuantParam { scale: quant.scale });
    }

    let shape = self.base.output_shape();
    let (grid_h, grid_w, targets) = (shape.dim(1), shape.dim(2), shape.dim(3));
    if grid_h == 0 || grid_w == 0 || targets == 0 {
      return Err(AlgorithmError::NotInitialized);
    }
    let (width, height) = self.base.input_size();
    let bw = width / grid_w as u16;
    let bh = height / grid_h as u16;
    let threshold = self.config.score_threshold;

    let data = self.base.engine().output(0);
    let expected = grid_h * grid_w * targets;
    if data.len() < expected {
      error!("输出张量过小: 期望 {}, 实际 {}", expected, data.len());
      return Err(AlgorithmError::invalid(format!(
        "输出张量过小: 期望 {}, 实际 {}",
        expected,
        data.len()
      )));
    }

    self.candidates.clear();
    for (cell, scores) in data[..expected].chunks_exact(targets).enumerate() {
      let (mut max_score, mut max_target) = (0u8, 0usize);
      for (target, &raw) in scores.iter().enumerate().skip(1) {
        let score = quant.dequantize_percent(raw);
        if score > max_score {
          max_score = score;
          max_target = target;
        }
      }

      if max_score > threshold && max_target != 0 {
        let (i, j) = ((cell / grid_w) as u16, (cell % grid_w) as u16);
        self.candidates.push(DetectBox::new(
          j * bw + bw / 2,
          i * bh + bh / 2,
          bw,
          bh,
          max_score,
          max_target as u8,
        ));
      }
    }

    self.candidates.sort_by_key(|b| b.x);
    for b in &self.candidates {
      debug!(
        "x: {}, y: {}, w: {}, h: {}, score: {}, target: {}",
        b.x, b.y, b.w, b.h, b.score, b.target
      );
    }
    debug!("FOMO 检测到 {} 个目标", self.candidates.len());

    std::mem::swap(&mut self.results, &mut self.candidates);
    Ok(())
  }

  fn results(&self) -> &[DetectBox] {
    &self.results
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    algorithm::AlgorithmState,
    engine::Shape,
    quant::QuantParam,
    testing::{FillConverter, MockEngine, frame},
  };

  // 1/128 可精确表示，raw * 100 / 128 向下取整
  const QUANT: QuantParam = QuantParam {
    scale: 1.0 / 128.0,
    zero_point: 0,
  };

  fn fomo(grid: usize, targets: usize) -> Fomo<MockEngine> {
    let engine = MockEngine::new([1, 16, 16, 3], [1, grid, grid, targets], QUANT);
    Fomo::with_config(
      engine,
      FillConverter::boxed(128),
      FomoConfig { score_threshold: 50 },
    )
  }

  #[test]
  fn single_cell_yields_one_centered_box() {
    let mut algo = fomo(4, 3);
    algo.init().unwrap();

    // 单元 (1, 2) 的分数为 [10, 85, 40]
    let cell = (4 + 2) * 3;
    algo.base_mut().engine_mut().next_output[cell..cell + 3].copy_from_slice(&[13, 109, 52]);

    let img = frame(16, 16);
    let boxes = algo.run(&img.as_view()).unwrap();
    assert_eq!(boxes, &[DetectBox::new(10, 6, 4, 4, 85, 1)]);
    assert_eq!(algo.state(), AlgorithmState::Ready);
  }

  #[test]
  fn background_never_wins() {
    let mut algo = fomo(2, 2);
    algo.init().unwrap();
    // 背景分数很高，前景刚好超过阈值
    algo.base_mut().engine_mut().next_output = vec![127, 66, 127, 10, 127, 0, 127, 0];

    let img = frame(16, 16);
    let boxes = algo.run(&img.as_view()).unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].target, 1);
    assert_eq!(boxes[0].score, 51);
  }

  #[test]
  fn ties_keep_lower_target() {
    let mut algo = fomo(1, 4);
    algo.init().unwrap();
    algo.base_mut().engine_mut().next_output = vec![0, 100, 120, 120];

    let img = frame(16, 16);
    let boxes = algo.run(&img.as_view()).unwrap();
    assert_eq!(boxes, &[DetectBox::new(8, 8, 16, 16, 93, 2)]);
  }

  #[test]
  fn results_sorted_by_x() {
    let mut algo = fomo(4, 2);
    algo.init().unwrap();
    let out = &mut algo.base_mut().engine_mut().next_output;
    // (行, 列): (0, 3) (1, 1) (3, 0)
    for (i, j) in [(0, 3), (1, 1), (3, 0)] {
      out[(i * 4 + j) * 2 + 1] = 100;
    }

    let img = frame(16, 16);
    let xs: Vec<u16> = algo.run(&img.as_view()).unwrap().iter().map(|b| b.x).collect();
    assert_eq!(xs, vec![2, 6, 14]);
  }

  #[test]
  fn score_equal_to_threshold_is_dropped() {
    let mut algo = fomo(1, 2);
    algo.init().unwrap();
    // 64 * 100 / 128 = 50
    algo.base_mut().engine_mut().next_output = vec![0, 64];

    let img = frame(16, 16);
    assert!(algo.run(&img.as_view()).unwrap().is_empty());

    algo.set_score_threshold(49);
    assert_eq!(algo.run(&img.as_view()).unwrap().len(), 1);
  }

  #[test]
  fn scale_factors_follow_source_size() {
    let mut algo = fomo(4, 2);
    algo.init().unwrap();
    let img = frame(32, 8);
    algo.run(&img.as_view()).unwrap();
    assert_eq!(algo.scale_factors(), (2.0, 0.5));
    // 预处理减去偏置
    assert!(algo.base().engine().input.iter().all(|&b| b == 0));
  }

  #[test]
  fn model_validation() {
    let ok = MockEngine::new([1, 96, 96, 1], [1, 12, 12, 3], QUANT);
    assert!(Fomo::is_model_valid(&ok));

    let yolo = MockEngine::new([1, 96, 96, 3], [1, 100, 7], QUANT);
    assert!(!Fomo::is_model_valid(&yolo));

    let rgba = MockEngine::new([1, 96, 96, 4], [1, 12, 12, 3], QUANT);
    assert!(!Fomo::is_model_valid(&rgba));

    let one_target = MockEngine::new([1, 96, 96, 3], [1, 12, 12, 1], QUANT);
    assert!(!Fomo::is_model_valid(&one_target));
  }

  #[test]
  fn init_rejects_unsupported_channels() {
    let engine = MockEngine::new([1, 16, 16, 4], [1, 4, 4, 2], QUANT);
    let mut algo = Fomo::new(engine, FillConverter::boxed(0));
    assert!(matches!(algo.init(), Err(AlgorithmError::InvalidArgument(_))));
    assert_eq!(algo.state(), AlgorithmState::Uninitialized);
  }

  #[test]
  fn init_rejects_bad_output() {
    let mut engine = MockEngine::new([1, 16, 16, 3], [1, 4, 4, 2], QUANT);
    engine.output_shape = Shape::from([1, 4, 8]);
    let mut algo = Fomo::new(engine, FillConverter::boxed(0));
    assert!(matches!(algo.init(), Err(AlgorithmError::InvalidArgument(_))));
    assert_eq!(algo.state(), AlgorithmState::Uninitialized);
  }

  #[test]
  fn invalid_scale_is_reported() {
    let mut algo = fomo(1, 2);
    algo.base_mut().engine_mut().output_quant = QuantParam::new(0.0, 0);
    algo.init().unwrap();

    let img = frame(16, 16);
    assert!(matches!(
      algo.run(&img.as_view()),
      Err(AlgorithmError::InvalidQuantParam { .. })
    ));
    assert_eq!(algo.state(), AlgorithmState::Ready);
  }

  #[test]
  fn engine_failure_keeps_previous_results() {
    let mut algo = fomo(1, 2);
    algo.init().unwrap();
    algo.base_mut().engine_mut().next_output = vec![0, 127];
    let img = frame(16, 16);
    assert_eq!(algo.run(&img.as_view()).unwrap().len(), 1);

    algo.base_mut().engine_mut().fail = true;
    algo.base_mut().engine_mut().next_output = vec![0, 0];
    assert!(matches!(
      algo.run(&img.as_view()),
      Err(AlgorithmError::EngineFailure(_))
    ));
    assert_eq!(algo.results().len(), 1);
    assert_eq!(algo.state(), AlgorithmState::Ready);
  }
}
