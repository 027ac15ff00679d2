// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/input.rs - 图像输入与解码
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

use std::io::Cursor;

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error};

use crate::frame::RgbRaster;

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 无效图像。三种情形在边界上都表现为 `InvalidImage`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("无法解码图像: {0}")]
  Undecodable(String),
  #[error("图像过小: {width}x{height}，至少需要 {min_pixels} 像素")]
  TooSmall {
    width: u32,
    height: u32,
    min_pixels: u64,
  },
  #[error("图像过大: {width}x{height}，最多允许 {max_pixels} 像素")]
  TooLarge {
    width: u32,
    height: u32,
    max_pixels: u64,
  },
}

/// 把字节解码为 RGB 栅格。先读取图像头检查像素数，再做完整解码，
/// 过大的输入不会被解码到内存中。不做缩放与裁剪。
pub fn decode(bytes: &[u8], min_pixels: u64, max_pixels: u64) -> Result<RgbRaster, DecodeError> {
  if bytes.is_empty() {
    error!("输入图像为空");
    return Err(DecodeError::Undecodable("空输入".to_string()));
  }

  let reader = || {
    ImageReader::new(Cursor::new(bytes))
      .with_guessed_format()
      .map_err(|e| DecodeError::Undecodable(e.to_string()))
  };

  let (width, height) = reader()?
    .into_dimensions()
    .map_err(|e| DecodeError::Undecodable(e.to_string()))?;
  let pixels = u64::from(width) * u64::from(height);
  debug!("图像尺寸: {}x{} ({} 像素)", width, height, pixels);

  if pixels < min_pixels {
    error!("图像像素数 {} 低于下限 {}", pixels, min_pixels);
    return Err(DecodeError::TooSmall {
      width,
      height,
      min_pixels,
    });
  }
  if pixels > max_pixels {
    error!("图像像素数 {} 超过上限 {}", pixels, max_pixels);
    return Err(DecodeError::TooLarge {
      width,
      height,
      max_pixels,
    });
  }

  let image = reader()?
    .decode()
    .map_err(|e| DecodeError::Undecodable(e.to_string()))?;
  Ok(RgbRaster::from(image.to_rgb8()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{ImageFormat, Rgb, RgbImage};

  fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 180, 160]));
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();
    bytes
  }

  #[test]
  fn decodes_png_without_resizing() {
    let raster = decode(&png(120, 80), 64 * 64, 16_000_000).unwrap();
    assert_eq!((raster.width(), raster.height()), (120, 80));
    assert_eq!(raster.pixel(0, 0), [200, 180, 160]);
  }

  #[test]
  fn rejects_empty_and_garbage_bytes() {
    assert!(matches!(
      decode(&[], 1, 100),
      Err(DecodeError::Undecodable(_))
    ));
    assert!(matches!(
      decode(b"definitely not an image", 1, 100),
      Err(DecodeError::Undecodable(_))
    ));
  }

  #[test]
  fn enforces_pixel_window() {
    assert_eq!(
      decode(&png(32, 32), 64 * 64, 16_000_000),
      Err(DecodeError::TooSmall {
        width: 32,
        height: 32,
        min_pixels: 4096
      })
    );
    assert!(matches!(
      decode(&png(100, 100), 1, 5000),
      Err(DecodeError::TooLarge { .. })
    ));
  }
}
