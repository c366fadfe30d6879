// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use std::path::Path;

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{
  frame::{Image, PixelFormat},
  geometry::{DetectBox, boxes_to_json},
};

const BOX_THICKNESS: u32 = 2;

/// 按类别循环取色
const PALETTE: [[u8; 3]; 6] = [
  [0, 0, 255],
  [255, 0, 0],
  [0, 200, 0],
  [255, 160, 0],
  [160, 0, 255],
  [0, 200, 200],
];

pub struct Draw {
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  /// 框为中心坐标，先转为左上角再绘制
  pub fn draw_detections_on_image(&self, image: &mut RgbImage, boxes: &[DetectBox]) {
    let (width, height) = (image.width() as i32, image.height() as i32);

    for b in boxes {
      let color = Rgb(PALETTE[b.target as usize % PALETTE.len()]);
      let x_min = (b.x as i32 - b.w as i32 / 2).clamp(0, width - 1);
      let y_min = (b.y as i32 - b.h as i32 / 2).clamp(0, height - 1);
      let x_max = (b.x as i32 + b.w as i32 / 2).clamp(0, width - 1);
      let y_max = (b.y as i32 + b.h as i32 / 2).clamp(0, height - 1);

      for t in 0..self.thickness as i32 {
        let (w, h) = (x_max - x_min - 2 * t, y_max - y_min - 2 * t);
        if w <= 0 || h <= 0 {
          break;
        }
        let rect = Rect::at(x_min + t, y_min + t).of_size(w as u32 + 1, h as u32 + 1);
        draw_hollow_rect_mut(image, rect, color);
      }
    }
  }

  pub fn draw_detection<B: AsRef<[u8]>>(
    &self,
    frame: &Image<B>,
    boxes: &[DetectBox],
  ) -> Option<RgbImage> {
    let mut image = to_rgb_image(frame)?;
    self.draw_detections_on_image(&mut image, boxes);
    Some(image)
  }
}

/// 只支持未压缩的 RGB888 与灰度帧
pub fn to_rgb_image<B: AsRef<[u8]>>(frame: &Image<B>) -> Option<RgbImage> {
  let (w, h) = (frame.width as u32, frame.height as u32);
  let size = frame.expected_size()?;
  let data = frame.data.as_ref().get(..size)?.to_vec();
  match frame.format {
    PixelFormat::Rgb888 => RgbImage::from_raw(w, h, data),
    PixelFormat::Grayscale => {
      GrayImage::from_raw(w, h, data).map(|gray| DynamicImage::ImageLuma8(gray).to_rgb8())
    }
    _ => None,
  }
}

/// 把检测结果写成与图像同名的 JSON 文件
pub fn record(boxes: &[DetectBox], path: &Path) -> Result<(), std::io::Error> {
  let json = serde_json::to_string_pretty(&boxes_to_json(boxes)).map_err(std::io::Error::other)?;
  std::fs::write(path.with_extension("json"), json)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn draws_box_outline_only() {
    let frame = Image::new(vec![0u8; 20 * 20 * 3], 20, 20, PixelFormat::Rgb888);
    let image = Draw::default()
      .draw_detection(&frame, &[DetectBox::new(10, 10, 8, 8, 90, 0)])
      .unwrap();

    assert_eq!(*image.get_pixel(6, 6), Rgb(PALETTE[0]));
    assert_eq!(*image.get_pixel(14, 10), Rgb(PALETTE[0]));
    assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
  }

  #[test]
  fn compressed_frames_are_not_drawn() {
    let frame = Image::new(vec![0u8; 10], 2, 2, PixelFormat::Jpeg);
    assert!(to_rgb_image(&frame).is_none());
  }
}
