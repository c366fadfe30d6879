// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/json_output.rs - JSON 结果输出
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

use std::{
  fs::File,
  io::{BufWriter, Write},
  sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
  },
};

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Image,
  geometry::{DetectBox, boxes_to_json},
  output::Render,
};

#[derive(Error, Debug)]
pub enum JsonOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("输出已被锁定")]
  Poisoned,
}

/// 每帧一行 JSON
///
/// `json:-` 或空路径写到标准输出，否则写入（覆盖）指定文件。
pub struct JsonOutput {
  writer: Mutex<Box<dyn Write + Send>>,
  frame_counter: AtomicU64,
}

impl FromUrlWithScheme for JsonOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonOutput {
  type Error = JsonOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonOutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    match uri.path() {
      "" | "-" => Ok(Self::new(std::io::stdout())),
      path => {
        info!("JSON 结果写入文件: {}", path);
        Ok(Self::new(BufWriter::new(File::create(path)?)))
      }
    }
  }
}

impl JsonOutput {
  pub fn new(writer: impl Write + Send + 'static) -> Self {
    Self {
      writer: Mutex::new(Box::new(writer)),
      frame_counter: AtomicU64::new(0),
    }
  }
}

impl<B: AsRef<[u8]>> Render<Image<B>, [DetectBox]> for JsonOutput {
  type Error = JsonOutputError;

  fn render_result(&self, frame: &Image<B>, result: &[DetectBox]) -> Result<(), Self::Error> {
    let index = self.frame_counter.fetch_add(1, Ordering::Relaxed);
    let line = json!({
      "frame": index,
      "width": frame.width,
      "height": frame.height,
      "boxes": boxes_to_json(result),
    });

    let mut writer = self.writer.lock().map_err(|_| JsonOutputError::Poisoned)?;
    serde_json::to_writer(&mut *writer, &line)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    debug!("第 {} 帧写出 {} 个目标", index, result.len());
    Ok(())
  }
}
