// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 图像帧定义
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

use thiserror::Error;

#[cfg(feature = "cpu_convert")]
mod convert;
#[cfg(feature = "cpu_convert")]
pub use self::convert::CpuConverter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
  #[default]
  Rgb888,
  Rgb565,
  Yuv422,
  Grayscale,
  Jpeg,
}

impl PixelFormat {
  /// 压缩格式返回 None
  pub fn bytes_per_pixel(&self) -> Option<usize> {
    match self {
      PixelFormat::Rgb888 => Some(3),
      PixelFormat::Rgb565 | PixelFormat::Yuv422 => Some(2),
      PixelFormat::Grayscale => Some(1),
      PixelFormat::Jpeg => None,
    }
  }

  /// 按通道数推断模型输入格式
  pub fn from_channels(channels: usize) -> Option<Self> {
    match channels {
      3 => Some(PixelFormat::Rgb888),
      1 => Some(PixelFormat::Grayscale),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
  #[default]
  Rotate0,
  Rotate90,
  Rotate180,
  Rotate270,
}

/// 图像
///
/// `B` 为像素存储：源图像通常是 `Vec<u8>` 或 `&[u8]`，
/// 写入模型输入时是借用自引擎输入张量的 `&mut [u8]`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image<B> {
  pub data: B,
  pub width: u16,
  pub height: u16,
  pub format: PixelFormat,
  pub rotation: Rotation,
}

impl<B> Image<B> {
  pub fn new(data: B, width: u16, height: u16, format: PixelFormat) -> Self {
    Self {
      data,
      width,
      height,
      format,
      rotation: Rotation::Rotate0,
    }
  }

  pub fn with_rotation(mut self, rotation: Rotation) -> Self {
    self.rotation = rotation;
    self
  }
}

impl<B: AsRef<[u8]>> Image<B> {
  pub fn size(&self) -> usize {
    self.data.as_ref().len()
  }

  /// 未压缩格式下的期望字节数
  pub fn expected_size(&self) -> Option<usize> {
    self
      .format
      .bytes_per_pixel()
      .map(|bpp| self.width as usize * self.height as usize * bpp)
  }

  pub fn as_view(&self) -> Image<&[u8]> {
    Image {
      data: self.data.as_ref(),
      width: self.width,
      height: self.height,
      format: self.format,
      rotation: self.rotation,
    }
  }
}

#[derive(Error, Debug)]
pub enum ConvertError {
  #[error("不支持的转换: {from:?} -> {to:?}")]
  Unsupported { from: PixelFormat, to: PixelFormat },
  #[error("图像数据大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  SizeMismatch { expected: usize, actual: usize },
  #[error("图像尺寸无效: {0}x{1}")]
  InvalidDimension(u16, u16),
  #[cfg(feature = "cpu_convert")]
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 颜色空间转换与缩放，把源图像写入模型输入
pub trait ImageConverter {
  fn convert(&self, src: &Image<&[u8]>, dst: &mut Image<&mut [u8]>) -> Result<(), ConvertError>;
}

impl<C: ImageConverter + ?Sized> ImageConverter for Box<C> {
  fn convert(&self, src: &Image<&[u8]>, dst: &mut Image<&mut [u8]>) -> Result<(), ConvertError> {
    (**self).convert(src, dst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn expected_size_follows_format() {
    let img = Image::new(vec![0u8; 12], 2, 2, PixelFormat::Rgb888);
    assert_eq!(img.expected_size(), Some(12));
    assert_eq!(img.size(), 12);

    let gray = Image::new(vec![0u8; 4], 2, 2, PixelFormat::Grayscale);
    assert_eq!(gray.expected_size(), Some(4));

    let jpeg = Image::new(vec![0u8; 100], 2, 2, PixelFormat::Jpeg);
    assert_eq!(jpeg.expected_size(), None);
  }

  #[test]
  fn channels_map_to_formats() {
    assert_eq!(PixelFormat::from_channels(3), Some(PixelFormat::Rgb888));
    assert_eq!(PixelFormat::from_channels(1), Some(PixelFormat::Grayscale));
    assert_eq!(PixelFormat::from_channels(4), None);
  }
}
