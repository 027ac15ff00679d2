// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/estimator.rs - 混合体重估计器
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

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  breed::BreedId,
  cancel::CancelToken,
  config::{AREA_SCALE, ConfigError, EstimatorConfig},
  detector::{BoundingBox, Detection, Detector, select_best},
  fallback::fallback_weight,
  features::{DetectionQuality, Features, extract},
  frame::RgbRaster,
  input::{DecodeError, decode},
  registry::{BreedParams, RegistryReader, RegistrySnapshot},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EstimateError {
  #[error("无效图像: {0}")]
  InvalidImage(#[from] DecodeError),
  #[error("推理已取消")]
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
  High,
  Medium,
  Low,
}

impl ConfidenceLevel {
  pub fn from_confidence(confidence: f64, config: &EstimatorConfig) -> Self {
    if confidence >= config.high_confidence {
      ConfidenceLevel::High
    } else if confidence >= config.medium_confidence {
      ConfidenceLevel::Medium
    } else {
      ConfidenceLevel::Low
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMethod {
  Hybrid,
  Fallback,
}

/// 对外返回的估计结果。回退路径下检测相关字段为 `None`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEstimate {
  pub breed: BreedId,
  pub weight_kg: f64,
  pub confidence: f64,
  pub confidence_level: ConfidenceLevel,
  pub method: EstimationMethod,
  pub bbox: Option<BoundingBox>,
  pub normalized_area: Option<f64>,
  pub detection_confidence: Option<f64>,
  pub size_penalty: Option<f64>,
  pub detection_quality: Option<DetectionQuality>,
  /// 回归值是否被截断到品种区间
  pub clamped: bool,
  pub processing_time_ms: u64,
  pub meets_quality_criteria: bool,
}

/// 仿射回归，面积先乘以 [`AREA_SCALE`]
pub fn regress(params: &BreedParams, normalized_area: f64) -> f64 {
  params.a * (normalized_area * AREA_SCALE) + params.b
}

/// 检测 + 选框 + 特征提取。后端出错、无合格候选或数值异常时返回 `None`
pub(crate) fn measure<D: Detector>(
  detector: &D,
  raster: &RgbRaster,
  config: &EstimatorConfig,
) -> Option<(Detection, Features)> {
  let result = match detector.infer(raster) {
    Ok(result) => result,
    Err(e) => {
      warn!("检测器出错，转入回退估计: {}", e);
      return None;
    }
  };
  let detection = select_best(&result, raster, config.score_threshold)?;
  let features = extract(&detection, raster, config);
  if !(features.normalized_area.is_finite() && features.size_penalty.is_finite()) {
    warn!("特征数值异常: {:?}", features);
    return None;
  }
  Some((detection, features))
}

pub struct HybridEstimator<D> {
  detector: D,
  registry: RegistryReader,
  config: EstimatorConfig,
}

impl<D: Detector> HybridEstimator<D> {
  pub fn new(detector: D, registry: RegistryReader) -> Self {
    Self {
      detector,
      registry,
      config: EstimatorConfig::default(),
    }
  }

  pub fn with_config(mut self, config: EstimatorConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    self.config = config;
    Ok(self)
  }

  pub fn config(&self) -> &EstimatorConfig {
    &self.config
  }

  pub fn estimate(&self, bytes: &[u8], breed: BreedId) -> Result<WeightEstimate, EstimateError> {
    self.estimate_with_cancel(bytes, breed, &CancelToken::default())
  }

  /// 取当前参数快照并在整个调用期间持有，期间的参数更新不影响本次结果
  pub fn estimate_with_cancel(
    &self,
    bytes: &[u8],
    breed: BreedId,
    cancel: &CancelToken,
  ) -> Result<WeightEstimate, EstimateError> {
    let snapshot = self.registry.snapshot();
    self.estimate_with_snapshot(&snapshot, bytes, breed, cancel)
  }

  pub fn estimate_with_snapshot(
    &self,
    snapshot: &RegistrySnapshot,
    bytes: &[u8],
    breed: BreedId,
    cancel: &CancelToken,
  ) -> Result<WeightEstimate, EstimateError> {
    let now = Instant::now();
    let params = snapshot.get(breed);
    let raster = decode(bytes, self.config.min_pixels, self.config.max_pixels)?;
    debug!("品种 {} 参数: {:?}", breed, params);

    if cancel.is_cancelled() {
      return Err(EstimateError::Cancelled);
    }
    let measured = measure(&self.detector, &raster, &self.config);
    if cancel.is_cancelled() {
      info!("检测完成后收到取消请求，丢弃本次结果");
      return Err(EstimateError::Cancelled);
    }

    let estimate = match measured.and_then(|(det, f)| self.hybrid(breed, &params, &det, &f)) {
      Some(estimate) => estimate,
      None => self.fallback(breed, &params, bytes),
    };
    let estimate = WeightEstimate {
      processing_time_ms: now.elapsed().as_millis() as u64,
      ..estimate
    };

    info!(
      "品种 {}: {:.1} kg, 置信度 {:.3} ({:?}, {:?}), 耗时 {} ms",
      breed,
      estimate.weight_kg,
      estimate.confidence,
      estimate.confidence_level,
      estimate.method,
      estimate.processing_time_ms
    );
    Ok(estimate)
  }

  fn hybrid(
    &self,
    breed: BreedId,
    params: &BreedParams,
    detection: &Detection,
    features: &Features,
  ) -> Option<WeightEstimate> {
    let raw = regress(params, features.normalized_area);
    if !raw.is_finite() {
      warn!("回归结果非有限值: {}", raw);
      return None;
    }
    let weight_kg = raw.clamp(params.min_kg, params.max_kg);
    let clamped = weight_kg != raw;

    let score = f64::from(detection.score);
    let mut confidence = (0.5 * score + 0.5 * features.size_penalty).clamp(0.0, 1.0);
    if clamped {
      debug!(
        "回归值 {:.1} kg 超出区间 [{}, {}]，降低置信度",
        raw, params.min_kg, params.max_kg
      );
      confidence *= self.config.clamp_confidence_factor;
    }
    let confidence_level = ConfidenceLevel::from_confidence(confidence, &self.config);

    Some(WeightEstimate {
      breed,
      weight_kg,
      confidence,
      confidence_level,
      method: EstimationMethod::Hybrid,
      bbox: Some(detection.bbox),
      normalized_area: Some(features.normalized_area),
      detection_confidence: Some(score),
      size_penalty: Some(features.size_penalty),
      detection_quality: Some(features.detection_quality),
      clamped,
      processing_time_ms: 0,
      meets_quality_criteria: confidence_level != ConfidenceLevel::Low,
    })
  }

  fn fallback(&self, breed: BreedId, params: &BreedParams, bytes: &[u8]) -> WeightEstimate {
    WeightEstimate {
      breed,
      weight_kg: fallback_weight(params, bytes, self.config.fallback_jitter),
      confidence: self.config.fallback_confidence,
      confidence_level: ConfidenceLevel::Low,
      method: EstimationMethod::Fallback,
      bbox: None,
      normalized_area: None,
      detection_confidence: None,
      size_penalty: None,
      detection_quality: None,
      clamped: false,
      processing_time_ms: 0,
      meets_quality_criteria: false,
    }
  }
}
