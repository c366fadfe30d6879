// 该文件是 Shanan （山南西风） 项目的一部分。
// src/algorithm/yolo.rs - YOLO 回归解码
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
  algorithm::{Algorithm, AlgorithmBase, AlgorithmError, AlgorithmInfo, YoloConfig},
  engine::Engine,
  frame::{Image, ImageConverter},
  geometry::DetectBox,
  nms::nms,
  quant::saturate_u8,
};

const INDEX_X: usize = 0;
const INDEX_Y: usize = 1;
const INDEX_W: usize = 2;
const INDEX_H: usize = 3;
const INDEX_S: usize = 4;
const INDEX_T: usize = 5;

const YOLO_MAX_CLASSES: usize = 256;

/// scale 低于该值时，置信度乘以 100，坐标按输入宽高的比例解释
const YOLO_RESCALE_LIMIT: f32 = 0.1;

/// 逐记录回归解码器
///
/// 输出张量为 `[1, num_records, 5 + num_classes]`，每条记录为
/// `[x, y, w, h, objectness, class_0 .. class_n]`。
/// 通过阈值的记录经过 NMS 后按 x 排序，再缩放回源图像坐标。
pub struct Yolo<E> {
  base: AlgorithmBase<E>,
  config: YoloConfig,
  w_scale: f32,
  h_scale: f32,
  results: Vec<DetectBox>,
  candidates: Vec<DetectBox>,
}

impl<E: Engine> Yolo<E> {
  pub fn new(engine: E, converter: Box<dyn ImageConverter>) -> Self {
    Self::with_config(engine, converter, YoloConfig::default())
  }

  pub fn with_config(engine: E, converter: Box<dyn ImageConverter>, config: YoloConfig) -> Self {
    Self {
      base: AlgorithmBase::new(engine, converter, AlgorithmInfo::YOLO),
      config,
      w_scale: 1.0,
      h_scale: 1.0,
      results: Vec::new(),
      candidates: Vec::new(),
    }
  }

  pub fn is_model_valid(engine: &E) -> bool {
    let input = engine.input_shape(0);
    let output = engine.output_shape(0);

    if input.rank() != 4 || output.rank() != 3 {
      return false;
    }
    if input[0] != 1 || input[1] == 0 || input[2] == 0 || !matches!(input[3], 1 | 3) {
      return false;
    }

    output[0] == 1
      && output[1] > 0
      && output[2] > INDEX_T
      && output[2] - INDEX_T <= YOLO_MAX_CLASSES
  }

  pub fn config(&self) -> YoloConfig {
    self.config
  }

  pub fn set_config(&mut self, config: YoloConfig) {
    self.config = config;
  }

  pub fn score_threshold(&self) -> u8 {
    self.config.score_threshold
  }

  pub fn set_score_threshold(&mut self, threshold: u8) {
    self.config.score_threshold = threshold;
  }

  pub fn nms_threshold(&self) -> u8 {
    self.config.nms_threshold
  }

  pub fn set_nms_threshold(&mut self, threshold: u8) {
    self.config.nms_threshold = threshold;
  }

  pub fn scale_factors(&self) -> (f32, f32) {
    (self.w_scale, self.h_scale)
  }
}

impl<E: Engine> Algorithm for Yolo<E> {
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
      error!("YOLO 输出张量形状无效: {}", shape);
      return Err(AlgorithmError::invalid(format!(
        "YOLO 输出张量形状无效: {}",
        shape
      )));
    }

    let records = self.base.output_shape().dim(1);
    self.results.clear();
    self.candidates.clear();
    self.results.reserve(records);
    self.candidates.reserve(records);
    debug!(
      "YOLO 初始化完成, 记录数 {}, 类别数 {}",
      records,
      self.base.output_shape().dim(2) - INDEX_T
    );
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
    let (records, elements) = (shape.dim(1), shape.dim(2));
    if records == 0 || elements <= INDEX_T {
      return Err(AlgorithmError::NotInitialized);
    }
    let (width, height) = self.base.input_size();
    let score_threshold = self.config.score_threshold;
    let nms_threshold = self.config.nms_threshold;
    let rescale = quant.scale < YOLO_RESCALE_LIMIT;

    let data = self.base.engine().output(0);
    let expected = records * elements;
    if data.len() < expected {
      error!("输出张量过小: 期望 {}, 实际 {}", expected, data.len());
      return Err(AlgorithmError::invalid(format!(
        "输出张量过小: 期望 {}, 实际 {}",
        expected,
        data.len()
      )));
    }

    self.candidates.clear();
    for record in data[..expected].chunks_exact(elements) {
      let mut score = quant.dequantize(record[INDEX_S]);
      if rescale {
        score *= 100.0;
      }
      if score <= score_threshold as f32 {
        continue;
      }

      // 纯 argmax，直接比较原始值
      let (mut max, mut target) = (i8::MIN, 0usize);
      for (j, &logit) in record[INDEX_T..].iter().enumerate() {
        if max < logit {
          max = logit;
          target = j;
        }
      }

      let coord = |index: usize, dim: u16| -> u16 {
        let v = quant.dequantize(record[index]);
        let v = if rescale { v * dim as f32 } else { v };
        (v as u16).min(dim)
      };
      let x = coord(INDEX_X, width);
      let y = coord(INDEX_Y, height);
      let w = coord(INDEX_W, width).min(width - x);
      let h = coord(INDEX_H, height).min(height - y);

      self
        .candidates
        .push(DetectBox::new(x, y, w, h, saturate_u8(score), target as u8));
    }

    let decoded = self.candidates.len();
    nms(&mut self.candidates, nms_threshold, score_threshold);
    self.candidates.sort_by_key(|b| b.x);

    for b in self.candidates.iter_mut() {
      b.x = (b.x as f32 * self.w_scale) as u16;
      b.y = (b.y as f32 * self.h_scale) as u16;
      b.w = (b.w as f32 * self.w_scale) as u16;
      b.h = (b.h as f32 * self.h_scale) as u16;
      debug!(
        "x: {}, y: {}, w: {}, h: {}, score: {}, target: {}",
        b.x, b.y, b.w, b.h, b.score, b.target
      );
    }
    debug!(
      "YOLO 解码 {} 个候选, NMS 后保留 {} 个",
      decoded,
      self.candidates.len()
    );

    std::mem::swap(&mut self.results, &mut self.candidates);
    Ok(())
  }

  fn results(&self) -> &[DetectBox] {
    &self.results
  }
}
