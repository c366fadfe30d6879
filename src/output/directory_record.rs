// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Image, PixelFormat},
  geometry::DetectBox,
  output::{
    Render,
    draw::{Draw, record, to_rgb_image},
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无法保存的像素格式: {0:?}")]
  UnsupportedFormat(PixelFormat),
}

pub enum DrawWrapper {
  /// 保存画好框的图像
  Draw(Draw),
  /// 保存原图，检测结果写入同名 JSON
  Record,
}

impl DrawWrapper {
  pub fn save_result<B: AsRef<[u8]>>(
    &self,
    path: &Path,
    frame: &Image<B>,
    result: &[DetectBox],
  ) -> Result<(), DirectoryRecordOutputError> {
    let unsupported = || DirectoryRecordOutputError::UnsupportedFormat(frame.format);
    match self {
      DrawWrapper::Draw(draw) => {
        let image = draw.draw_detection(frame, result).ok_or_else(unsupported)?;
        image.save(path)?;
      }
      DrawWrapper::Record => {
        let image = to_rgb_image(frame).ok_or_else(unsupported)?;
        image.save(path)?;
        record(result, path)?;
      }
    };

    Ok(())
  }
}

/// 按 `年/月/日` 分目录保存每一帧
///
/// `folder:///data?record` 保存原图与 JSON，默认保存画框后的图像；
/// 没有检测结果的帧只有带 `always` 时才保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let draw = if uri.query_pairs().any(|(k, _)| k == "record") {
      DrawWrapper::Record
    } else {
      DrawWrapper::Draw(Draw::default())
    };
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw,
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl<B: AsRef<[u8]>> Render<Image<B>, [DetectBox]> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Image<B>, result: &[DetectBox]) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }
    let path = self.frame_path()?;
    self.draw.save_result(&path, frame, result)?;
    debug!("记录帧: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
      for entry in std::fs::read_dir(d).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          found.push(path);
        }
      }
    }
    found.sort();
    found
  }

  #[test]
  fn record_mode_writes_image_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?record", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let frame = Image::new(vec![0u8; 8 * 8 * 3], 8, 8, PixelFormat::Rgb888);
    output.render_result(&frame, &[]).unwrap();
    assert!(files(dir.path()).is_empty());

    output
      .render_result(&frame, &[DetectBox::new(4, 4, 2, 2, 60, 0)])
      .unwrap();
    let found = files(dir.path());
    assert_eq!(found.len(), 2);
    assert!(found.iter().any(|p| p.extension().is_some_and(|e| e == "json")));
    assert!(found.iter().any(|p| p.extension().is_some_and(|e| e == "png")));
  }

  #[test]
  fn always_saves_empty_frames() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?always", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let frame = Image::new(vec![0u8; 4 * 4 * 3], 4, 4, PixelFormat::Rgb888);
    output.render_result(&frame, &[]).unwrap();
    assert_eq!(files(dir.path()).len(), 1);
  }
}
