// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/frame.rs - RGB 栅格定义
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

use image::RgbImage;

const RGB_CHANNELS: usize = 3;

/// 3 通道 8 位行优先（HWC）栅格，保持原始宽高比
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbRaster {
  width: usize,
  height: usize,
  data: Box<[u8]>,
}

impl RgbRaster {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let size = RGB_CHANNELS * width * height;
    Self {
      width,
      height,
      data: vec![0u8; size].into_boxed_slice(),
    }
  }

  /// 由 HWC 数据构造，长度不匹配时返回 `None`
  pub fn from_raw(height: usize, width: usize, data: Vec<u8>) -> Option<Self> {
    if data.len() != RGB_CHANNELS * width * height {
      return None;
    }
    Some(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn pixel_count(&self) -> u64 {
    (self.width as u64) * (self.height as u64)
  }

  pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
    let index = (y * self.width + x) * RGB_CHANNELS;
    [self.data[index], self.data[index + 1], self.data[index + 2]]
  }

  pub fn center(&self) -> (f64, f64) {
    (self.width as f64 / 2.0, self.height as f64 / 2.0)
  }

  pub fn as_hwc(&self) -> &[u8] {
    &self.data
  }

  pub fn to_rgb_image(&self) -> Option<RgbImage> {
    RgbImage::from_raw(self.width as u32, self.height as u32, self.data.to_vec())
  }
}

impl From<RgbImage> for RgbRaster {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width: width as usize,
      height: height as usize,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn rgb_image_round_trips_row_major() {
    let mut image = RgbImage::new(4, 3);
    image.put_pixel(3, 1, Rgb([10, 20, 30]));
    let raster = RgbRaster::from(image.clone());

    assert_eq!(raster.width(), 4);
    assert_eq!(raster.height(), 3);
    assert_eq!(raster.pixel(3, 1), [10, 20, 30]);
    assert_eq!(raster.as_hwc()[(4 + 3) * 3], 10);
    assert_eq!(raster.to_rgb_image().unwrap(), image);
  }

  #[test]
  fn from_raw_checks_length() {
    assert!(RgbRaster::from_raw(2, 2, vec![0; 11]).is_none());
    assert!(RgbRaster::from_raw(2, 2, vec![0; 12]).is_some());
  }
}
