// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/detector.rs - 轮廓检测器
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

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{FromUrl, frame::RgbRaster};

#[cfg(feature = "classic_detector")]
mod classic;
#[cfg(feature = "classic_detector")]
pub use self::classic::{ClassicDetector, ClassicDetectorError};

/// COCO 数据集中 "cow" 的类别编号
pub const COCO_COW_ID: u32 = 19;

/// 检测后端。后端可以是训练好的网络、传统分割器或测试桩，
/// 只负责给出候选框，选框策略由 [`select_best`] 统一处理。
pub trait Detector {
  type Label: WithLabel;
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, raster: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error>;
}

impl<D: Detector + ?Sized> Detector for &D {
  type Label = D::Label;
  type Error = D::Error;

  fn infer(&self, raster: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error> {
    (**self).infer(raster)
  }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  type Label = D::Label;
  type Error = D::Error;

  fn infer(&self, raster: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error> {
    (**self).infer(raster)
  }
}

impl<D: Detector + ?Sized> Detector for Arc<D> {
  type Label = D::Label;
  type Error = D::Error;

  fn infer(&self, raster: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error> {
    (**self).infer(raster)
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn from_label_id(id: u32) -> Self;
  fn is_bovine(&self) -> bool;
}

/// 检测类别：牛或其他（保留原始类别编号）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilhouetteLabel {
  Cattle,
  Other(u32),
}

impl WithLabel for SilhouetteLabel {
  fn to_label_str(&self) -> String {
    match self {
      SilhouetteLabel::Cattle => "cow".to_string(),
      SilhouetteLabel::Other(id) => format!("class-{}", id),
    }
  }

  fn from_label_id(id: u32) -> Self {
    if id == COCO_COW_ID {
      SilhouetteLabel::Cattle
    } else {
      SilhouetteLabel::Other(id)
    }
  }

  fn is_bovine(&self) -> bool {
    matches!(self, SilhouetteLabel::Cattle)
  }
}

#[derive(Debug, Clone)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
  pub mask_area_px: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> DetectResult<T> {
  pub fn empty() -> Self {
    Self {
      items: Box::new([]),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl<T> From<Vec<DetectItem<T>>> for DetectResult<T> {
  fn from(items: Vec<DetectItem<T>>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BoundingBox {
  pub fn width(&self) -> f64 {
    f64::from(self.x2 - self.x1)
  }

  pub fn height(&self) -> f64 {
    f64::from(self.y2 - self.y1)
  }

  pub fn area(&self) -> f64 {
    self.width() * self.height()
  }

  pub fn center(&self) -> (f64, f64) {
    (
      (f64::from(self.x1) + f64::from(self.x2)) / 2.0,
      (f64::from(self.y1) + f64::from(self.y2)) / 2.0,
    )
  }

  /// 裁剪到图像范围内，退化或含非有限值时返回 `None`
  fn clipped(bbox: &[f32; 4], width: usize, height: usize) -> Option<Self> {
    if bbox.iter().any(|v| !v.is_finite()) {
      return None;
    }
    let (w, h) = (width as f32, height as f32);
    let clipped = Self {
      x1: bbox[0].clamp(0.0, w),
      y1: bbox[1].clamp(0.0, h),
      x2: bbox[2].clamp(0.0, w),
      y2: bbox[3].clamp(0.0, h),
    };
    (clipped.x2 > clipped.x1 && clipped.y2 > clipped.y1).then_some(clipped)
  }
}

/// 选中的唯一检测结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub score: f32,
  pub mask_area_px: Option<u64>,
}

/// 选框策略：只保留牛类且得分不低于阈值的候选；取框面积最大者，
/// 面积相同取得分高者，仍相同取离图像中心近者。
pub fn select_best<T: WithLabel>(
  result: &DetectResult<T>,
  raster: &RgbRaster,
  min_score: f32,
) -> Option<Detection> {
  let (cx, cy) = raster.center();
  let center_distance = |bbox: &BoundingBox| {
    let (x, y) = bbox.center();
    (x - cx).hypot(y - cy)
  };

  let best = result
    .items
    .iter()
    .filter(|item| item.kind.is_bovine() && item.score.is_finite() && item.score >= min_score)
    .filter_map(|item| {
      BoundingBox::clipped(&item.bbox, raster.width(), raster.height()).map(|bbox| Detection {
        bbox,
        score: item.score.min(1.0),
        mask_area_px: item.mask_area_px,
      })
    })
    .min_by(|lhs, rhs| {
      rhs
        .bbox
        .area()
        .total_cmp(&lhs.bbox.area())
        .then_with(|| rhs.score.total_cmp(&lhs.score))
        .then_with(|| center_distance(&lhs.bbox).total_cmp(&center_distance(&rhs.bbox)))
    });

  debug!(
    "候选 {} 个，选中: {:?}",
    result.len(),
    best.as_ref().map(|d| (d.bbox, d.score))
  );
  best
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[cfg(feature = "classic_detector")]
  #[error("传统分割器错误: {0}")]
  ClassicDetectorError(#[from] ClassicDetectorError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择检测后端
pub enum DetectorWrapper {
  #[cfg(feature = "classic_detector")]
  Classic(ClassicDetector),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "classic_detector")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ClassicDetector::SCHEME {
        return Ok(DetectorWrapper::Classic(ClassicDetector::from_url(url)?));
      }
    }
    Err(DetectorError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Detector for DetectorWrapper {
  type Label = SilhouetteLabel;
  type Error = DetectorError;

  fn infer(&self, raster: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error> {
    match self {
      #[cfg(feature = "classic_detector")]
      DetectorWrapper::Classic(detector) => detector.infer(raster).map_err(DetectorError::from),
      #[allow(unreachable_patterns)]
      _ => Ok(DetectResult::empty()),
    }
  }
}
