// 该文件是 Niuzhong （牛重） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use niuzhong::{
  detector::{DetectItem, DetectResult, Detector, SilhouetteLabel},
  frame::RgbRaster,
};

pub const SIDE: u32 = 200;

/// 白底上画黑色矩形 `[x0, y0, x1)`×`[y0, y1)` 的 PNG
pub fn scene_png(width: u32, height: u32, rect: Option<(u32, u32, u32, u32)>) -> Vec<u8> {
  let image = RgbImage::from_fn(width, height, |x, y| match rect {
    Some((x0, y0, x1, y1)) if (x0..x1).contains(&x) && (y0..y1).contains(&y) => Rgb([0, 0, 0]),
    _ => Rgb([255, 255, 255]),
  });
  let mut bytes = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    .unwrap();
  bytes
}

pub fn plain_png() -> Vec<u8> {
  scene_png(SIDE, SIDE, None)
}

/// 固定返回一个框的检测器
pub struct FixedDetector {
  pub bbox: [f32; 4],
  pub score: f32,
}

impl Detector for FixedDetector {
  type Label = SilhouetteLabel;
  type Error = std::convert::Infallible;

  fn infer(&self, _: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error> {
    Ok(
      vec![DetectItem {
        kind: SilhouetteLabel::Cattle,
        score: self.score,
        bbox: self.bbox,
        mask_area_px: None,
      }]
      .into(),
    )
  }
}

pub struct NoDetection;

impl Detector for NoDetection {
  type Label = SilhouetteLabel;
  type Error = std::convert::Infallible;

  fn infer(&self, _: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error> {
    Ok(DetectResult::empty())
  }
}

#[derive(Debug, thiserror::Error)]
#[error("backend offline")]
pub struct BackendOffline;

pub struct FailingDetector;

impl Detector for FailingDetector {
  type Label = SilhouetteLabel;
  type Error = BackendOffline;

  fn infer(&self, _: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error> {
    Err(BackendOffline)
  }
}
