// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/features.rs - 形态特征提取
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

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{config::EstimatorConfig, detector::Detection, frame::RgbRaster};

const GOOD_SIZE_PENALTY: f64 = 0.8;
const GOOD_SCORE: f64 = 0.6;
const FAIR_FLOOR: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionQuality {
  Good,
  Fair,
  Poor,
}

impl DetectionQuality {
  /// 两项都达标为 good；都不低于 0.4 为 fair；否则 poor
  pub fn classify(size_penalty: f64, score: f64) -> Self {
    if size_penalty >= GOOD_SIZE_PENALTY && score >= GOOD_SCORE {
      DetectionQuality::Good
    } else if size_penalty >= FAIR_FLOOR && score >= FAIR_FLOOR {
      DetectionQuality::Fair
    } else {
      DetectionQuality::Poor
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Features {
  pub normalized_area: f64,
  pub size_penalty: f64,
  pub detection_quality: DetectionQuality,
}

/// 外接框中心相对图像中心的偏移，按半宽/半高归一化后取较大者，映射为 `[0, 1]` 的居中度
fn centering(detection: &Detection, raster: &RgbRaster) -> f64 {
  let (cx, cy) = raster.center();
  let (bx, by) = detection.bbox.center();
  let dx = ((bx - cx) / cx).abs();
  let dy = ((by - cy) / cy).abs();
  (1.0 - dx.max(dy)).clamp(0.0, 1.0)
}

pub fn extract(detection: &Detection, raster: &RgbRaster, config: &EstimatorConfig) -> Features {
  let silhouette_px = match detection.mask_area_px {
    Some(px) => px as f64,
    None => detection.bbox.area(),
  };
  let (clip_lo, clip_hi) = config.area_clip;
  let normalized_area = (silhouette_px / raster.pixel_count() as f64).clamp(clip_lo, clip_hi);

  let band = config.size_band.score(normalized_area);
  let centered = centering(detection, raster);
  let size_penalty =
    (band * ((1.0 - config.centering_weight) + config.centering_weight * centered)).clamp(0.0, 1.0);
  let detection_quality = DetectionQuality::classify(size_penalty, f64::from(detection.score));

  debug!(
    "归一化面积: {:.4}, 面积带: {:.3}, 居中度: {:.3}, 构图评分: {:.3}, 质量: {:?}",
    normalized_area, band, centered, size_penalty, detection_quality
  );

  Features {
    normalized_area,
    size_penalty,
    detection_quality,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detector::BoundingBox;
  use approx::assert_relative_eq;

  fn detection(bbox: [f32; 4], score: f32, mask: Option<u64>) -> Detection {
    Detection {
      bbox: BoundingBox {
        x1: bbox[0],
        y1: bbox[1],
        x2: bbox[2],
        y2: bbox[3],
      },
      score,
      mask_area_px: mask,
    }
  }

  #[test]
  fn bbox_is_the_silhouette_proxy_without_mask() {
    let raster = RgbRaster::with_shape(200, 200);
    let f = extract(
      &detection([80.0, 80.0, 120.0, 120.0], 0.9, None),
      &raster,
      &EstimatorConfig::default(),
    );
    assert_relative_eq!(f.normalized_area, 0.04, epsilon = 1e-9);
    assert_relative_eq!(f.size_penalty, 1.0, epsilon = 1e-9);
    assert_eq!(f.detection_quality, DetectionQuality::Good);
  }

  #[test]
  fn mask_area_takes_precedence_and_is_clipped() {
    let raster = RgbRaster::with_shape(100, 100);
    let config = EstimatorConfig::default();
    let f = extract(&detection([0.0, 0.0, 100.0, 100.0], 0.9, Some(2500)), &raster, &config);
    assert_relative_eq!(f.normalized_area, 0.25, epsilon = 1e-9);

    let f = extract(&detection([0.0, 0.0, 100.0, 100.0], 0.9, None), &raster, &config);
    assert_relative_eq!(f.normalized_area, 0.9, epsilon = 1e-9);

    let f = extract(&detection([50.0, 50.0, 51.0, 51.0], 0.9, None), &raster, &config);
    assert_relative_eq!(f.normalized_area, 0.01, epsilon = 1e-9);
    assert_eq!(f.size_penalty, 0.0);
    assert_eq!(f.detection_quality, DetectionQuality::Poor);
  }

  #[test]
  fn off_center_boxes_are_penalised() {
    let raster = RgbRaster::with_shape(200, 200);
    // 中心 (125, 100)，水平偏移半宽的四分之一
    let f = extract(
      &detection([105.0, 80.0, 145.0, 120.0], 0.85, None),
      &raster,
      &EstimatorConfig::default(),
    );
    assert_relative_eq!(f.size_penalty, 0.9, epsilon = 1e-9);
    assert_eq!(f.detection_quality, DetectionQuality::Good);

    // 中心 (190, 10)，贴近角落
    let f = extract(
      &detection([170.0, 0.0, 210.0, 20.0], 0.85, None),
      &raster,
      &EstimatorConfig::default(),
    );
    assert!(f.size_penalty < 0.7);
  }

  #[test]
  fn quality_buckets() {
    assert_eq!(DetectionQuality::classify(0.9, 0.7), DetectionQuality::Good);
    assert_eq!(DetectionQuality::classify(0.7, 0.9), DetectionQuality::Fair);
    assert_eq!(DetectionQuality::classify(0.9, 0.5), DetectionQuality::Fair);
    assert_eq!(DetectionQuality::classify(0.3, 0.9), DetectionQuality::Poor);
    assert_eq!(DetectionQuality::classify(0.9, 0.3), DetectionQuality::Poor);
  }
}
