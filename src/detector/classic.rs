// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/detector/classic.rs - 传统前景分割检测器
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

//! 不依赖神经网络的轮廓检测：灰度化后用 Otsu 阈值二值化，
//! 前景极性由图像边框的平均亮度决定，再做 8 连通域标记，每个连通域输出一个候选框。
//! 候选得分为连通域在外接框内的填充率，掩码面积为连通域像素数。

use image::{GrayImage, Luma, imageops};
use imageproc::{
  contrast::otsu_level,
  region_labelling::{Connectivity, connected_components},
};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detector::{DetectItem, DetectResult, Detector, SilhouetteLabel},
  frame::RgbRaster,
};

const CLASSIC_MIN_AREA: f64 = 0.005;
const CLASSIC_MAX_AREA: f64 = 0.98;

#[derive(Error, Debug)]
pub enum ClassicDetectorError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数 {0} 无效: {1}")]
  InvalidParameter(String, String),
  #[error("栅格数据与尺寸不符")]
  InvalidRaster,
}

#[derive(Debug, Clone)]
pub struct ClassicDetector {
  /// 连通域面积占比下限
  min_area: f64,
  /// 连通域面积占比上限，超过视为背景
  max_area: f64,
}

impl Default for ClassicDetector {
  fn default() -> Self {
    Self {
      min_area: CLASSIC_MIN_AREA,
      max_area: CLASSIC_MAX_AREA,
    }
  }
}

impl FromUrlWithScheme for ClassicDetector {
  const SCHEME: &'static str = "classic";
}

impl FromUrl for ClassicDetector {
  type Error = ClassicDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ClassicDetectorError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut detector = Self::default();
    for (k, v) in url.query_pairs() {
      let parse = || {
        v.parse::<f64>()
          .ok()
          .filter(|value| (0.0..=1.0).contains(value))
          .ok_or_else(|| ClassicDetectorError::InvalidParameter(k.to_string(), v.to_string()))
      };
      match k.as_ref() {
        "min_area" => detector.min_area = parse()?,
        "max_area" => detector.max_area = parse()?,
        _ => debug!("忽略未知参数: {}={}", k, v),
      }
    }
    if detector.min_area >= detector.max_area {
      return Err(ClassicDetectorError::InvalidParameter(
        "min_area".to_string(),
        format!("{} >= max_area {}", detector.min_area, detector.max_area),
      ));
    }
    Ok(detector)
  }
}

impl ClassicDetector {
  pub fn new(min_area: f64, max_area: f64) -> Self {
    Self { min_area, max_area }
  }

  /// 前景掩码：边框偏亮时取不高于阈值的暗像素，否则取高于阈值的亮像素。
  /// 纯色图像两种情形下都没有前景。
  fn foreground(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    let border_mean = border_mean(gray);
    let dark_object = border_mean > f64::from(level);
    debug!(
      "Otsu 阈值: {}, 边框均值: {:.1}, 暗目标: {}",
      level, border_mean, dark_object
    );

    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
      let value = gray.get_pixel(x, y)[0];
      let is_object = if dark_object {
        value <= level
      } else {
        value > level
      };
      Luma([if is_object { 255 } else { 0 }])
    })
  }
}

fn border_mean(gray: &GrayImage) -> f64 {
  let (w, h) = gray.dimensions();
  let mut sum = 0u64;
  let mut count = 0u64;
  for (x, y, pixel) in gray.enumerate_pixels() {
    if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
      sum += u64::from(pixel[0]);
      count += 1;
    }
  }
  if count == 0 {
    0.0
  } else {
    sum as f64 / count as f64
  }
}

#[derive(Debug, Clone, Copy)]
struct Component {
  pixels: u64,
  x_min: u32,
  y_min: u32,
  x_max: u32,
  y_max: u32,
}

impl Detector for ClassicDetector {
  type Label = SilhouetteLabel;
  type Error = ClassicDetectorError;

  fn infer(&self, raster: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error> {
    let rgb = raster
      .to_rgb_image()
      .ok_or(ClassicDetectorError::InvalidRaster)?;
    let gray = imageops::grayscale(&rgb);
    let mask = Self::foreground(&gray);
    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    let mut components: Vec<Option<Component>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
      let id = label[0] as usize;
      if id == 0 {
        continue;
      }
      if components.len() <= id {
        components.resize(id + 1, None);
      }
      let component = components[id].get_or_insert(Component {
        pixels: 0,
        x_min: x,
        y_min: y,
        x_max: x,
        y_max: y,
      });
      component.pixels += 1;
      component.x_min = component.x_min.min(x);
      component.y_min = component.y_min.min(y);
      component.x_max = component.x_max.max(x);
      component.y_max = component.y_max.max(y);
    }

    let total = raster.pixel_count() as f64;
    let items: Vec<_> = components
      .into_iter()
      .flatten()
      .filter(|c| {
        let fraction = c.pixels as f64 / total;
        fraction >= self.min_area && fraction <= self.max_area
      })
      .map(|c| {
        let bbox_area = u64::from(c.x_max - c.x_min + 1) * u64::from(c.y_max - c.y_min + 1);
        DetectItem {
          kind: SilhouetteLabel::Cattle,
          score: (c.pixels as f64 / bbox_area as f64) as f32,
          bbox: [
            c.x_min as f32,
            c.y_min as f32,
            (c.x_max + 1) as f32,
            (c.y_max + 1) as f32,
          ],
          mask_area_px: Some(c.pixels),
        }
      })
      .collect();

    debug!("传统分割器输出 {} 个候选", items.len());
    Ok(DetectResult::from(items))
  }
}
