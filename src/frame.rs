// 该文件是 Wuzhi （物知） 项目的一部分。
// src/frame.rs - NHWC 帧定义与预处理
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

use image::{ImageBuffer, Rgb, RgbImage, imageops::FilterType};
use tracing::debug;

use crate::input::AsNhwcFrame;

const RGB_CHANNELS: usize = 3;

/// SSD MobileNet 的固定输入尺寸
pub const SSD_INPUT_SIZE: u32 = 300;

/// 模型输入帧：300x300 RGB, NHWC 排列
pub type SsdInputFrame = RgbNhwcFrame<SSD_INPUT_SIZE, SSD_INPUT_SIZE>;

#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> From<Vec<u8>> for RgbNhwcFrame<W, H> {
  fn from(data: Vec<u8>) -> Self {
    if data.len() != (RGB_CHANNELS * W as usize * H as usize) {
      panic!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        RGB_CHANNELS * W as usize * H as usize,
        data.len()
      );
    }

    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 模型输入张量形状 [1, H, W, C]
  pub fn shape(&self) -> [usize; 4] {
    [1, self.height(), self.width(), self.channels()]
  }

  /// 双线性缩放任意尺寸的图像到 W x H
  pub fn resize_from(image: &RgbImage) -> Self {
    debug!(
      "预处理: {}x{} -> {}x{}",
      image.width(),
      image.height(),
      W,
      H
    );
    let resized = image::imageops::resize(image, W, H, FilterType::Triangle);
    // RgbImage 的内存布局即为 HWC
    Self::from(resized.into_raw())
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

impl<const W: u32, const H: u32> ToRgbImage for RgbNhwcFrame<W, H> {
  fn to_rgb_image(&self) -> RgbImage {
    let width = self.width() as u32;
    let data = self.as_nhwc();

    // 将 NHWC 转为 RGB 图像
    ImageBuffer::from_fn(width, self.height() as u32, |x, y| {
      let idx = (y as usize * width as usize + x as usize) * RGB_CHANNELS;
      Rgb([data[idx], data[idx + 1], data[idx + 2]])
    })
  }
}
