// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像文件
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

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detector::BoundingBox,
  estimator::{ConfidenceLevel, WeightEstimate},
  frame::RgbRaster,
  output::Render,
};

const BOX_THICKNESS: i32 = 2;
const BAR_HEIGHT: u32 = 8;
const BAR_TRACK: [u8; 3] = [64, 64, 64];

fn level_color(level: ConfidenceLevel) -> Rgb<u8> {
  match level {
    ConfidenceLevel::High => Rgb([0, 200, 0]),
    ConfidenceLevel::Medium => Rgb([255, 200, 0]),
    ConfidenceLevel::Low => Rgb([230, 0, 0]),
  }
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("栅格尺寸无效")]
  InvalidRaster,
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 在原图上画出所选框和置信度条，框与条的颜色对应置信度等级。
/// 回退结果没有框，只在图像顶部画置信度条。
pub struct SaveImageFileOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(Self::new(uri.path()))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }

  pub fn annotate(&self, image: &mut RgbImage, estimate: &WeightEstimate) {
    let color = level_color(estimate.confidence_level);
    let (w, h) = (image.width() as i32, image.height() as i32);

    let (bar_x, bar_y, bar_w) = match estimate.bbox.as_ref().and_then(|b| pixel_rect(b, w, h)) {
      Some((x0, y0, x1, y1)) => {
        for t in 0..BOX_THICKNESS {
          let (bw, bh) = (x1 - x0 - 2 * t, y1 - y0 - 2 * t);
          if bw <= 0 || bh <= 0 {
            break;
          }
          let rect = Rect::at(x0 + t, y0 + t).of_size(bw as u32, bh as u32);
          draw_hollow_rect_mut(image, rect, color);
        }
        // 框上方放不下时放到框下沿
        let bar_y = if y0 >= BAR_HEIGHT as i32 {
          y0 - BAR_HEIGHT as i32
        } else {
          y1.min(h - BAR_HEIGHT as i32).max(0)
        };
        (x0, bar_y, (x1 - x0) as u32)
      }
      None => (0, 0, w as u32),
    };

    if bar_w == 0 || h <= 0 {
      return;
    }
    let bar_h = BAR_HEIGHT.min(h as u32);
    draw_filled_rect_mut(image, Rect::at(bar_x, bar_y).of_size(bar_w, bar_h), Rgb(BAR_TRACK));
    let filled = (f64::from(bar_w) * estimate.confidence.clamp(0.0, 1.0)).round() as u32;
    if filled > 0 {
      draw_filled_rect_mut(image, Rect::at(bar_x, bar_y).of_size(filled, bar_h), color);
    }
  }

  fn save_image(&self, image: RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    info!("保存标注图像到文件: {}", self.path.display());

    Ok(())
  }
}

/// 框转为像素坐标 `(x0, y0, x1, y1)`，截断到图像内；退化时返回 `None`
fn pixel_rect(bbox: &BoundingBox, w: i32, h: i32) -> Option<(i32, i32, i32, i32)> {
  let x0 = (bbox.x1.floor() as i32).clamp(0, w);
  let y0 = (bbox.y1.floor() as i32).clamp(0, h);
  let x1 = (bbox.x2.ceil() as i32).clamp(0, w);
  let y1 = (bbox.y2.ceil() as i32).clamp(0, h);
  (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

impl Render<RgbRaster, WeightEstimate> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbRaster, result: &WeightEstimate) -> Result<(), Self::Error> {
    let mut image = frame
      .to_rgb_image()
      .ok_or(SaveImageFileError::InvalidRaster)?;
    self.annotate(&mut image, result);
    self.save_image(image)
  }
}
