// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 输入、解码、输出的任务循环
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

use std::{thread, time::Duration};

use tracing::{info, warn};

use crate::{
  algorithm::{Algorithm, StageTiming},
  frame::Image,
  geometry::DetectBox,
  output::Render,
};

pub trait Task<I, A, O>: Sized {
  type Error;
  fn run_task(self, input: I, algorithm: A, output: O) -> Result<(), Self::Error>;
}

fn log_timing(index: usize, count: usize, timing: &StageTiming) {
  info!(
    "({}) 检测到 {} 个目标, 预处理: {:.2?}, 推理: {:.2?}, 后处理: {:.2?}",
    index, count, timing.preprocess, timing.run, timing.postprocess
  );
}

pub struct OneShotTask;

impl<B, RE, I, A, O> Task<I, A, O> for OneShotTask
where
  B: AsRef<[u8]>,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Image<B>>,
  A: Algorithm,
  O: Render<Image<B>, [DetectBox], Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut algorithm: A, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    algorithm.init()?;
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功 ({}x{})，开始推理...", frame.width, frame.height);

    let result = algorithm.run(&frame.as_view())?;
    output.render_result(&frame, result)?;
    log_timing(0, algorithm.results().len(), &algorithm.timing());

    algorithm.deinit();
    Ok(())
  }
}

/// 对同一帧重复运行，统计各阶段平均耗时
pub struct RepeatShotTask {
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { times: 1000 }
  }
}

impl RepeatShotTask {
  /// 前两轮作为预热，不计入平均值
  const WARMUP: usize = 2;

  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times;
    self
  }
}

impl<B, RE, I, A, O> Task<I, A, O> for RepeatShotTask
where
  B: AsRef<[u8]>,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Image<B>>,
  A: Algorithm,
  O: Render<Image<B>, [DetectBox], Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut algorithm: A, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    algorithm.init()?;
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");

    let mut timings = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let result = algorithm.run(&frame.as_view())?;
      output.render_result(&frame, result)?;
      let timing = algorithm.timing();
      log_timing(i, algorithm.results().len(), &timing);
      timings.push(timing);
    }

    let counted = &timings[Self::WARMUP.min(timings.len())..];
    if counted.is_empty() {
      warn!("运行次数不足, 无法统计平均耗时");
    } else {
      let n = counted.len() as u32;
      warn!(
        "平均耗时 预处理: {:.2?}, 推理: {:.2?}, 后处理: {:.2?}",
        counted.iter().map(|t| t.preprocess).sum::<Duration>() / n,
        counted.iter().map(|t| t.run).sum::<Duration>() / n,
        counted.iter().map(|t| t.postprocess).sum::<Duration>() / n,
      );
    }

    algorithm.deinit();
    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<B, RE, I, A, O> Task<I, A, O> for ContinuousTask
where
  B: AsRef<[u8]>,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Image<B>>,
  A: Algorithm,
  O: Render<Image<B>, [DetectBox], Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut algorithm: A, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    algorithm.init()?;
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let mut frame_index = 0;
    for frame in input {
      frame_index += 1;
      match algorithm.run(&frame.as_view()) {
        Ok(result) => {
          output.render_result(&frame, result)?;
          log_timing(frame_index, algorithm.results().len(), &algorithm.timing());
        }
        // 单帧失败不中断循环，上一帧结果保持不变
        Err(e) => warn!("第 {} 帧处理失败: {}", frame_index, e),
      }

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    algorithm.deinit();
    info!("任务完成，退出");
    Ok(())
  }
}
