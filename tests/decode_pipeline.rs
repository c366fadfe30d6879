// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/decode_pipeline.rs - 解码流水线集成测试
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

use std::time::Duration;

use proptest::prelude::*;
use shanan_micro::{
  Algorithm, AlgorithmError, DetectBox, Fomo, QuantParam, Yolo,
  algorithm::{
    AlgorithmConfig, AlgorithmState, AlgorithmType, AlgorithmWrapper, FomoConfig, YoloConfig,
    algorithm_type_from_engine, available_algorithms,
  },
  testing::{FillConverter, MockEngine, frame},
};

/// 1/128 精确可表示：raw 的百分比为 raw * 100 / 128
const FOMO_QUANT: QuantParam = QuantParam {
  scale: 1.0 / 128.0,
  zero_point: 0,
};

fn fomo(grid: usize, targets: usize, threshold: u8) -> Fomo<MockEngine> {
  let engine = MockEngine::new([1, 96, 96, 3], [1, grid, grid, targets], FOMO_QUANT);
  let mut algo = Fomo::with_config(
    engine,
    FillConverter::boxed(128),
    FomoConfig {
      score_threshold: threshold,
    },
  );
  algo.init().unwrap();
  algo
}

fn yolo(records: usize, classes: usize, quant: QuantParam) -> Yolo<MockEngine> {
  let engine = MockEngine::new([1, 64, 64, 3], [1, records, 5 + classes], quant);
  let mut algo = Yolo::new(engine, FillConverter::boxed(128));
  algo.init().unwrap();
  algo
}

#[test]
fn heatmap_example_scenario() {
  // 4x4 网格，单元 (1, 2) 的分数为 [bg=10, t1=85, t2=40]，阈值 50
  let engine = MockEngine::new([1, 16, 16, 3], [1, 4, 4, 3], FOMO_QUANT);
  let mut algo = Fomo::with_config(
    engine,
    FillConverter::boxed(0),
    FomoConfig {
      score_threshold: 50,
    },
  );
  algo.init().unwrap();

  let offset = (4 + 2) * 3;
  algo.base_mut().engine_mut().next_output[offset..offset + 3].copy_from_slice(&[13, 109, 52]);

  let img = frame(16, 16);
  let boxes = algo.run(&img.as_view()).unwrap();
  assert_eq!(boxes.len(), 1);
  let b = boxes[0];
  assert_eq!((b.target, b.score), (1, 85));
  assert_eq!((b.x, b.y, b.w, b.h), (2 * 4 + 2, 4 + 2, 4, 4));
}

#[test]
fn heatmap_single_cell_for_every_cell() {
  let mut algo = fomo(3, 2, 50);
  let img = frame(96, 96);

  for cell in 0..9 {
    let out = &mut algo.base_mut().engine_mut().next_output;
    out.fill(0);
    out[cell * 2 + 1] = 120;

    let boxes = algo.run(&img.as_view()).unwrap();
    let (i, j) = ((cell / 3) as u16, (cell % 3) as u16);
    assert_eq!(boxes, &[DetectBox::new(j * 32 + 16, i * 32 + 16, 32, 32, 93, 1)]);
  }
}

proptest! {
  #[test]
  fn heatmap_random_grids_hold_properties(
    threshold in 0u8..100,
    heatmap in prop::collection::vec(any::<i8>(), 12 * 12 * 4),
  ) {
    let mut algo = fomo(12, 4, threshold);
    algo.base_mut().engine_mut().next_output = heatmap;
    let img = frame(96, 96);

    let boxes = algo.run(&img.as_view()).unwrap().to_vec();
    prop_assert!(boxes.windows(2).all(|w| w[0].x <= w[1].x), "{:?}", boxes);
    for b in &boxes {
      prop_assert!(b.score > threshold);
      prop_assert!(b.target >= 1 && b.target < 4);
      prop_assert!(b.x >= b.w / 2 && b.x + b.w / 2 <= 96);
      prop_assert!(b.y >= b.h / 2 && b.y + b.h / 2 <= 96);
    }
  }
}

#[test]
fn regression_example_scenario() {
  // 同类两框 IoU = 0.9，分数 70 与 90，NMS 阈值 45
  let mut algo = yolo(2, 1, QuantParam::default());
  algo.set_nms_threshold(45);
  algo.base_mut().engine_mut().next_output = vec![
    20, 20, 20, 20, 70, 0, //
    20, 19, 20, 18, 90, 0,
  ];

  let img = frame(64, 64);
  let boxes = algo.run(&img.as_view()).unwrap();
  assert_eq!(boxes, &[DetectBox::new(20, 19, 20, 18, 90, 0)]);
}

#[test]
fn regression_half_resolution_doubles_coordinates() {
  let mut algo = yolo(3, 2, QuantParam::default());
  algo.base_mut().engine_mut().next_output = vec![
    10, 12, 8, 6, 80, 0, 5, //
    40, 30, 10, 10, 60, 9, 1, //
    25, 50, 6, 4, 10, 0, 0,
  ];

  let model = frame(64, 64);
  let at_model: Vec<DetectBox> = algo.run(&model.as_view()).unwrap().to_vec();

  let source = frame(128, 128);
  let at_source = algo.run(&source.as_view()).unwrap();
  assert_eq!(at_model.len(), 2);
  assert_eq!(at_source.len(), 2);
  for (m, s) in at_model.iter().zip(at_source) {
    assert_eq!((s.x, s.y, s.w, s.h), (m.x * 2, m.y * 2, m.w * 2, m.h * 2));
    assert_eq!((s.score, s.target), (m.score, m.target));
  }
}

proptest! {
  #[test]
  fn regression_random_records_hold_properties(
    threshold in 0u8..60,
    nms_threshold in 0u8..100,
    records in prop::collection::vec(any::<i8>(), 40 * 8),
  ) {
    let mut algo = yolo(40, 3, QuantParam::new(0.5, 0));
    algo.set_score_threshold(threshold);
    algo.set_nms_threshold(nms_threshold);
    algo.base_mut().engine_mut().next_output = records;
    let img = frame(128, 128);

    let boxes = algo.run(&img.as_view()).unwrap().to_vec();
    prop_assert!(boxes.windows(2).all(|w| w[0].x <= w[1].x), "{:?}", boxes);
    for b in &boxes {
      prop_assert!(b.score > threshold);
      prop_assert!(b.target < 3);
      prop_assert!(b.x as u32 + b.w as u32 <= 128, "{:?}", b);
      prop_assert!(b.y as u32 + b.h as u32 <= 128, "{:?}", b);
    }
  }
}

#[test]
fn conversion_failure_keeps_previous_results() {
  let mut algo = yolo(1, 1, QuantParam::default());
  algo.base_mut().engine_mut().next_output = vec![10, 10, 4, 4, 90, 0];
  let img = frame(64, 64);
  let first = algo.run(&img.as_view()).unwrap().to_vec();
  assert_eq!(first.len(), 1);

  algo.base_mut().engine_mut().next_output = vec![0; 6];
  let empty = shanan_micro::frame::Image::new(&[][..], 64, 64, shanan_micro::frame::PixelFormat::Rgb888);
  assert!(matches!(
    algo.run(&empty),
    Err(AlgorithmError::ConversionFailed(_))
  ));
  assert_eq!(algo.results(), &first[..]);
  assert_eq!(algo.state(), AlgorithmState::Ready);
}

#[test]
fn engine_failure_keeps_previous_results() {
  let mut algo = fomo(2, 2, 50);
  algo.base_mut().engine_mut().next_output = vec![0, 127, 0, 0, 0, 0, 0, 0];
  let img = frame(96, 96);
  let first = algo.run(&img.as_view()).unwrap().to_vec();

  algo.base_mut().engine_mut().fail = true;
  let err = algo.run(&img.as_view()).unwrap_err();
  assert!(matches!(err, AlgorithmError::EngineFailure(_)));
  assert_eq!(err.to_string(), "推理引擎错误: mock engine failure");
  assert_eq!(algo.results(), &first[..]);

  algo.base_mut().engine_mut().fail = false;
  assert_eq!(algo.run(&img.as_view()).unwrap(), &first[..]);
}

#[test]
fn non_positive_scale_is_rejected() {
  for scale in [0.0, -0.5, f32::NAN] {
    let mut algo = yolo(1, 1, QuantParam::new(scale, 0));
    let img = frame(64, 64);
    assert!(matches!(
      algo.run(&img.as_view()),
      Err(AlgorithmError::InvalidQuantParam { .. })
    ));
    assert!(algo.results().is_empty());
    assert_eq!(algo.state(), AlgorithmState::Ready);
  }
}

#[test]
fn run_requires_init() {
  let engine = MockEngine::new([1, 16, 16, 3], [1, 4, 4, 2], FOMO_QUANT);
  let mut algo = Fomo::new(engine, FillConverter::boxed(0));
  let img = frame(16, 16);
  assert!(matches!(
    algo.run(&img.as_view()),
    Err(AlgorithmError::NotInitialized)
  ));

  algo.init().unwrap();
  algo.run(&img.as_view()).unwrap();
  algo.deinit();
  assert_eq!(algo.state(), AlgorithmState::Uninitialized);
  assert!(algo.results().is_empty());
  assert!(matches!(
    algo.run(&img.as_view()),
    Err(AlgorithmError::NotInitialized)
  ));
}

#[test]
fn each_cycle_returns_to_ready() {
  let mut algo = fomo(2, 2, 50);
  assert_eq!(algo.state(), AlgorithmState::Ready);
  algo.base_mut().engine_mut().next_output = vec![0, 127, 0, 0, 0, 0, 0, 0];
  let img = frame(96, 96);

  for _ in 0..3 {
    assert_eq!(algo.run(&img.as_view()).unwrap().len(), 1);
    assert_eq!(algo.state(), AlgorithmState::Ready);
  }

  algo.deinit();
  assert_eq!(algo.state(), AlgorithmState::Uninitialized);
  assert!(matches!(
    algo.run(&img.as_view()),
    Err(AlgorithmError::NotInitialized)
  ));
}

#[test]
fn init_rejects_unsupported_channel_count() {
  let engine = MockEngine::new([1, 16, 16, 4], [1, 100, 6], QuantParam::default());
  let mut algo = Yolo::new(engine, FillConverter::boxed(0));
  assert!(matches!(algo.init(), Err(AlgorithmError::InvalidArgument(_))));
}

#[test]
fn stage_timings_are_recorded() {
  let engine = MockEngine::new([1, 16, 16, 1], [1, 4, 4, 2], FOMO_QUANT);
  let converter = Box::new(FillConverter::new(0).with_delay(Duration::from_millis(5)));
  let mut algo = Fomo::new(engine, converter);
  algo.init().unwrap();

  let img = frame(16, 16);
  algo.run(&img.as_view()).unwrap();
  assert!(algo.preprocess_time() >= 5);
  assert!(algo.timing().preprocess >= Duration::from_millis(5));
  assert!(algo.run_time() < 1000);
  assert!(algo.postprocess_time() < 1000);
}

#[test]
fn model_shapes_select_algorithm() {
  let fomo = MockEngine::new([1, 96, 96, 3], [1, 12, 12, 2], FOMO_QUANT);
  let yolo = MockEngine::new([1, 192, 192, 3], [1, 2268, 6], FOMO_QUANT);
  let other = MockEngine::new([1, 96, 96, 3], [1, 10], FOMO_QUANT);

  assert_eq!(algorithm_type_from_engine(&fomo), AlgorithmType::Fomo);
  assert_eq!(algorithm_type_from_engine(&yolo), AlgorithmType::Yolo);
  assert_eq!(algorithm_type_from_engine(&other), AlgorithmType::Undefined);

  let wrapper = AlgorithmWrapper::detect(yolo, FillConverter::boxed(0), None).unwrap();
  assert_eq!(wrapper.config(), AlgorithmConfig::Yolo(YoloConfig::default()));
  assert_eq!(wrapper.info().kind, AlgorithmType::Yolo);

  assert!(matches!(
    AlgorithmWrapper::detect(other, FillConverter::boxed(0), None),
    Err(AlgorithmError::InvalidArgument(_))
  ));

  let kinds: Vec<AlgorithmType> = available_algorithms().iter().map(|a| a.kind).collect();
  assert_eq!(kinds, vec![AlgorithmType::Fomo, AlgorithmType::Yolo]);
  assert_eq!(available_algorithms()[1].to_json()["type"], 3);
}

#[test]
fn wrapper_runs_configured_decoder() {
  let url = url::Url::parse("fomo://?score=30").unwrap();
  let config = <AlgorithmConfig as shanan_micro::FromUrl>::from_url(&url).unwrap();
  let engine = MockEngine::new([1, 16, 16, 3], [1, 2, 2, 2], FOMO_QUANT);
  let mut algo = AlgorithmWrapper::from_config(engine, FillConverter::boxed(0), config);
  algo.init().unwrap();

  // 40 * 100 / 128 = 31 > 30
  algo.base_mut().engine_mut().next_output = vec![0, 40, 0, 0, 0, 0, 0, 0];
  let img = frame(16, 16);
  let boxes = algo.run(&img.as_view()).unwrap();
  assert_eq!(boxes, &[DetectBox::new(4, 4, 8, 8, 31, 1)]);
}
