// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame/convert.rs - CPU 图像格式转换
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

use image::{
  DynamicImage, GrayImage, ImageBuffer, ImageFormat, Rgb, RgbImage,
  imageops::{self, FilterType},
};
use tracing::{debug, error};

use crate::frame::{ConvertError, Image, ImageConverter, PixelFormat, Rotation};

/// 基于 `image` 的转换器
///
/// 支持 RGB888 / RGB565（大端）/ YUV422（YUYV）/ 灰度 / JPEG 源图像，
/// 输出 RGB888 或灰度。先旋转，再缩放到目标尺寸。
#[derive(Debug, Clone, Copy)]
pub struct CpuConverter {
  filter: FilterType,
}

impl Default for CpuConverter {
  fn default() -> Self {
    Self {
      filter: FilterType::Nearest,
    }
  }
}

impl CpuConverter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_filter(mut self, filter: FilterType) -> Self {
    self.filter = filter;
    self
  }

  fn decode(&self, src: &Image<&[u8]>) -> Result<RgbImage, ConvertError> {
    let (w, h) = (src.width as u32, src.height as u32);
    let pixels = w as usize * h as usize;
    let data = src.data;

    let required = match src.format {
      PixelFormat::Yuv422 => pixels.div_ceil(2) * 4,
      _ => src.expected_size().unwrap_or(0),
    };
    if data.len() < required {
      error!("源图像数据不足: 期望 {}, 实际 {}", required, data.len());
      return Err(ConvertError::SizeMismatch {
        expected: required,
        actual: data.len(),
      });
    }
    let mismatch = || ConvertError::SizeMismatch {
      expected: required,
      actual: data.len(),
    };

    let image = match src.format {
      PixelFormat::Rgb888 => RgbImage::from_raw(w, h, data[..required].to_vec()).ok_or_else(mismatch)?,
      PixelFormat::Grayscale => {
        let gray = GrayImage::from_raw(w, h, data[..required].to_vec()).ok_or_else(mismatch)?;
        DynamicImage::ImageLuma8(gray).to_rgb8()
      }
      PixelFormat::Rgb565 => ImageBuffer::from_fn(w, h, |x, y| {
        let i = (y as usize * w as usize + x as usize) * 2;
        let v = u16::from_be_bytes([data[i], data[i + 1]]);
        let r = ((v >> 11) & 0x1f) as u8;
        let g = ((v >> 5) & 0x3f) as u8;
        let b = (v & 0x1f) as u8;
        Rgb([(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)])
      }),
      PixelFormat::Yuv422 => ImageBuffer::from_fn(w, h, |x, y| {
        let idx = y as usize * w as usize + x as usize;
        let base = (idx / 2) * 4;
        let luma = data[base + (idx % 2) * 2];
        yuv_to_rgb(luma, data[base + 1], data[base + 3])
      }),
      PixelFormat::Jpeg => image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8(),
    };

    Ok(image)
  }
}

// BT.601
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> Rgb<u8> {
  let c = y as i32 - 16;
  let d = u as i32 - 128;
  let e = v as i32 - 128;
  let clip = |x: i32| x.clamp(0, 255) as u8;
  Rgb([
    clip((298 * c + 409 * e + 128) >> 8),
    clip((298 * c - 100 * d - 208 * e + 128) >> 8),
    clip((298 * c + 516 * d + 128) >> 8),
  ])
}

impl ImageConverter for CpuConverter {
  fn convert(&self, src: &Image<&[u8]>, dst: &mut Image<&mut [u8]>) -> Result<(), ConvertError> {
    if src.width == 0 || src.height == 0 {
      return Err(ConvertError::InvalidDimension(src.width, src.height));
    }
    if dst.width == 0 || dst.height == 0 {
      return Err(ConvertError::InvalidDimension(dst.width, dst.height));
    }

    let dst_bpp = match dst.format {
      PixelFormat::Rgb888 | PixelFormat::Grayscale => dst.format.bytes_per_pixel().unwrap_or(0),
      to => {
        return Err(ConvertError::Unsupported {
          from: src.format,
          to,
        });
      }
    };
    let expected = dst.width as usize * dst.height as usize * dst_bpp;
    if dst.data.len() < expected {
      return Err(ConvertError::SizeMismatch {
        expected,
        actual: dst.data.len(),
      });
    }

    let decoded = self.decode(src)?;
    let rotated = match src.rotation {
      Rotation::Rotate0 => decoded,
      Rotation::Rotate90 => imageops::rotate90(&decoded),
      Rotation::Rotate180 => imageops::rotate180(&decoded),
      Rotation::Rotate270 => imageops::rotate270(&decoded),
    };

    let (w, h) = (dst.width as u32, dst.height as u32);
    let resized = if rotated.dimensions() == (w, h) {
      rotated
    } else {
      imageops::resize(&rotated, w, h, self.filter)
    };
    debug!(
      "图像转换: {}x{} {:?} -> {}x{} {:?}",
      src.width, src.height, src.format, dst.width, dst.height, dst.format
    );

    match dst.format {
      PixelFormat::Grayscale => {
        let gray = DynamicImage::ImageRgb8(resized).to_luma8();
        dst.data[..expected].copy_from_slice(gray.as_raw());
      }
      _ => dst.data[..expected].copy_from_slice(resized.as_raw()),
    }

    Ok(())
  }
}
