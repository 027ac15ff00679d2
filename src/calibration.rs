// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/calibration.rs - 离线标定
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

//! 按品种拟合回归系数。
//!
//! 流程：全部样本先解码，再逐个检测并缓存 `(normalized_area, true_weight)`，
//! 之后在搜索框内以平均绝对误差为损失做有界优化。引擎只产出报告与参数更新建议，
//! 写入参数表需要调用方显式执行 [`CalibrationReport::accept`]。

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  breed::BreedId,
  cancel::CancelToken,
  config::{CalibrationConfig, ConfigError, EstimatorConfig},
  detector::Detector,
  estimator::measure,
  input::decode,
  registry::{BreedParams, RegistryError, RegistryUpdate, RegistryWriter},
};

pub mod metrics;
pub mod optimize;

pub use self::metrics::{CrossValidation, FeatureSample, FitMetrics};
use self::{
  metrics::{evaluate, fold_split, least_squares, mean_absolute_error},
  optimize::{BoundedNelderMead, Cancelled, Minimum},
};

/// 标定照片目录中的体重清单文件名
pub const WEIGHTS_FILE: &str = "weights.json";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
  #[error("品种 {breed} 没有可用样本（丢弃 {discarded} 个）")]
  InsufficientData { breed: BreedId, discarded: usize },
  #[error(transparent)]
  InvalidParams(#[from] RegistryError),
  #[error("标定已取消")]
  Cancelled,
  #[error("I/O 错误: {0}")]
  Io(String),
  #[error("体重清单格式错误: {0}")]
  WeightsFile(String),
}

impl From<Cancelled> for CalibrationError {
  fn from(_: Cancelled) -> Self {
    CalibrationError::Cancelled
  }
}

#[derive(Debug, Clone)]
pub struct CalibrationSample {
  pub image_bytes: Vec<u8>,
  pub true_weight_kg: f64,
  pub breed: BreedId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
  pub breed: BreedId,
  pub a: f64,
  pub b: f64,
  pub mae: f64,
  pub rmse: f64,
  pub r2: f64,
  pub n_samples: usize,
  pub converged: bool,
  /// 最优解落在搜索框边界上，需要放宽搜索范围
  pub bound_hit: bool,
  /// 样本数偏少
  pub low_confidence: bool,
  pub discarded: usize,
  pub iterations: usize,
  pub min_kg: f64,
  pub max_kg: f64,
  pub cross_validation: Option<CrossValidation>,
  pub generated_at: String,
}

impl CalibrationReport {
  /// 参数表更新建议，沿用起始参数的体重区间
  pub fn proposal(&self) -> RegistryUpdate {
    RegistryUpdate::new(
      self.breed,
      BreedParams::new(self.a, self.b, self.min_kg, self.max_kg),
    )
  }

  /// 操作员确认后写入参数表
  pub fn accept(&self, writer: &RegistryWriter) -> Result<(), RegistryError> {
    info!("接受品种 {} 的标定结果: a={:.4}, b={:.2}", self.breed, self.a, self.b);
    writer.apply(&self.proposal())
  }
}

/// 照片目录：`weights.json` 中列出但文件缺失的条目计入 `missing`
#[derive(Debug, Clone)]
pub struct PhotoSet {
  pub samples: Vec<CalibrationSample>,
  pub missing: usize,
}

/// 读取 `<dir>/weights.json`（`{"<文件名>": 体重}`）及同目录下的图像
pub fn load_photo_dir(dir: &Path, breed: BreedId) -> Result<PhotoSet, CalibrationError> {
  let manifest = dir.join(WEIGHTS_FILE);
  let text = std::fs::read_to_string(&manifest)
    .map_err(|e| CalibrationError::Io(format!("{}: {}", manifest.display(), e)))?;
  let weights: BTreeMap<String, f64> =
    serde_json::from_str(&text).map_err(|e| CalibrationError::WeightsFile(e.to_string()))?;

  let mut samples = Vec::with_capacity(weights.len());
  let mut missing = 0;
  for (name, true_weight_kg) in weights {
    match std::fs::read(dir.join(&name)) {
      Ok(image_bytes) => samples.push(CalibrationSample {
        image_bytes,
        true_weight_kg,
        breed,
      }),
      Err(e) => {
        warn!("无法读取标定图像 {}: {}", name, e);
        missing += 1;
      }
    }
  }
  info!(
    "从 {} 载入 {} 个样本，缺失 {} 个",
    dir.display(),
    samples.len(),
    missing
  );
  Ok(PhotoSet { samples, missing })
}

pub struct CalibrationEngine<D> {
  detector: D,
  estimator_config: EstimatorConfig,
  config: CalibrationConfig,
}

impl<D: Detector> CalibrationEngine<D> {
  pub fn new(detector: D) -> Self {
    Self {
      detector,
      estimator_config: EstimatorConfig::default(),
      config: CalibrationConfig::default(),
    }
  }

  pub fn with_estimator_config(mut self, config: EstimatorConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    self.estimator_config = config;
    Ok(self)
  }

  /// 搜索框与优化参数在此校验，`fit` 不再重复检查
  pub fn with_config(mut self, config: CalibrationConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    self.config = config;
    Ok(self)
  }

  pub fn calibrate_photo_dir(
    &self,
    dir: &Path,
    breed: BreedId,
    start: BreedParams,
    cancel: &CancelToken,
  ) -> Result<CalibrationReport, CalibrationError> {
    let photos = load_photo_dir(dir, breed)?;
    let mut report = self
      .calibrate(breed, start, photos.samples, cancel)
      .map_err(|e| match e {
        CalibrationError::InsufficientData { breed, discarded } => {
          CalibrationError::InsufficientData {
            breed,
            discarded: discarded + photos.missing,
          }
        }
        e => e,
      })?;
    report.discarded += photos.missing;
    Ok(report)
  }

  /// 从原始样本标定。样本在本调用内被消耗。
  pub fn calibrate(
    &self,
    breed: BreedId,
    start: BreedParams,
    samples: Vec<CalibrationSample>,
    cancel: &CancelToken,
  ) -> Result<CalibrationReport, CalibrationError> {
    start.validate(breed)?;
    let total = samples.len();

    let mut rasters = Vec::with_capacity(total);
    for (i, sample) in samples.into_iter().enumerate() {
      if cancel.is_cancelled() {
        return Err(CalibrationError::Cancelled);
      }
      if sample.breed != breed {
        warn!("样本 {} 品种为 {}，与 {} 不符，丢弃", i, sample.breed, breed);
        continue;
      }
      if !(sample.true_weight_kg.is_finite() && sample.true_weight_kg > 0.0) {
        warn!("样本 {} 体重 {} 无效，丢弃", i, sample.true_weight_kg);
        continue;
      }
      match decode(
        &sample.image_bytes,
        self.estimator_config.min_pixels,
        self.estimator_config.max_pixels,
      ) {
        Ok(raster) => rasters.push((i, raster, sample.true_weight_kg)),
        Err(e) => warn!("样本 {} 解码失败，丢弃: {}", i, e),
      }
    }

    let mut features = Vec::with_capacity(rasters.len());
    for (i, raster, true_weight_kg) in rasters {
      if cancel.is_cancelled() {
        return Err(CalibrationError::Cancelled);
      }
      match measure(&self.detector, &raster, &self.estimator_config) {
        Some((_, f)) => {
          debug!("样本 {}: 归一化面积 {:.4}, 体重 {} kg", i, f.normalized_area, true_weight_kg);
          features.push(FeatureSample::new(f.normalized_area, true_weight_kg));
        }
        None => warn!("样本 {} 未检测到目标，丢弃", i),
      }
    }

    let discarded = total - features.len();
    self.fit(breed, start, &features, discarded, cancel)
  }

  /// 在缓存特征上拟合 `(a, b)` 并生成报告
  pub fn fit(
    &self,
    breed: BreedId,
    start: BreedParams,
    samples: &[FeatureSample],
    discarded: usize,
    cancel: &CancelToken,
  ) -> Result<CalibrationReport, CalibrationError> {
    start.validate(breed)?;
    if samples.is_empty() {
      warn!("品种 {} 没有可用样本", breed);
      return Err(CalibrationError::InsufficientData { breed, discarded });
    }
    let low_confidence = samples.len() < self.config.min_samples_warning;
    if low_confidence {
      warn!(
        "品种 {} 仅有 {} 个样本，结果可信度低",
        breed,
        samples.len()
      );
    }

    let minimum = self.optimize(start, samples, cancel)?;
    let [a, b] = minimum.x;
    let metrics = evaluate(a, b, samples);
    let bound_hit = self.on_bound(a, b);
    if bound_hit {
      warn!(
        "最优解 a={:.4}, b={:.2} 落在搜索边界上，建议放宽搜索范围",
        a, b
      );
    }
    let cross_validation = self.cross_validate(start, samples, cancel)?;

    info!(
      "品种 {} 标定完成: a={:.4}, b={:.2}, MAE={:.2}, RMSE={:.2}, R²={:.4}, 样本 {}, 收敛 {}",
      breed, a, b, metrics.mae, metrics.rmse, metrics.r2, samples.len(), minimum.converged
    );

    Ok(CalibrationReport {
      breed,
      a,
      b,
      mae: metrics.mae,
      rmse: metrics.rmse,
      r2: metrics.r2,
      n_samples: samples.len(),
      converged: minimum.converged,
      bound_hit,
      low_confidence,
      discarded,
      iterations: minimum.iterations,
      min_kg: start.min_kg,
      max_kg: start.max_kg,
      cross_validation,
      generated_at: chrono::Utc::now().to_rfc3339(),
    })
  }

  /// 最小二乘解与当前参数中损失较低者作为起点
  fn optimize(
    &self,
    start: BreedParams,
    samples: &[FeatureSample],
    cancel: &CancelToken,
  ) -> Result<Minimum<2>, Cancelled> {
    let (a_lo, a_hi) = self.config.a_bounds;
    let (b_lo, b_hi) = self.config.b_bounds;
    let clamp = |(a, b): (f64, f64)| [a.clamp(a_lo, a_hi), b.clamp(b_lo, b_hi)];

    let loss = |x: &[f64; 2]| mean_absolute_error(x[0], x[1], samples);
    let mut origin = clamp((start.a, start.b));
    if let Some(ls) = least_squares(samples).map(clamp) {
      if loss(&ls) < loss(&origin) {
        origin = ls;
      }
    }
    debug!("优化起点: a={:.4}, b={:.2}", origin[0], origin[1]);

    BoundedNelderMead::new([a_lo, b_lo], [a_hi, b_hi])
      .max_iterations(self.config.max_iterations)
      .tolerance(self.config.tolerance)
      .restarts(self.config.restarts)
      .minimize(loss, origin, cancel)
  }

  fn on_bound(&self, a: f64, b: f64) -> bool {
    let near = |value: f64, (lo, hi): (f64, f64)| {
      let eps = (hi - lo) * 1e-4;
      value - lo <= eps || hi - value <= eps
    };
    near(a, self.config.a_bounds) || near(b, self.config.b_bounds)
  }

  /// 每折至少两个样本时才做交叉验证
  fn cross_validate(
    &self,
    start: BreedParams,
    samples: &[FeatureSample],
    cancel: &CancelToken,
  ) -> Result<Option<CrossValidation>, Cancelled> {
    let folds = self.config.cv_folds;
    if folds < 2 || samples.len() < 2 * folds {
      return Ok(None);
    }

    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    for fold in 0..folds {
      if cancel.is_cancelled() {
        return Err(Cancelled);
      }
      let (train, test) = fold_split(samples, folds, fold);
      let [a, b] = self.optimize(start, &train, cancel)?.x;
      for sample in &test {
        let r = sample.residual(a, b);
        abs_sum += r.abs();
        sq_sum += r * r;
      }
    }
    let n = samples.len() as f64;
    let cv = CrossValidation {
      folds,
      mae: abs_sum / n,
      rmse: (sq_sum / n).sqrt(),
    };
    debug!("交叉验证: {:?}", cv);
    Ok(Some(cv))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::AREA_SCALE,
    detector::{DetectResult, SilhouetteLabel},
    frame::RgbRaster,
  };

  struct NoDetector;

  impl Detector for NoDetector {
    type Label = SilhouetteLabel;
    type Error = std::convert::Infallible;

    fn infer(&self, _: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error> {
      Ok(DetectResult::empty())
    }
  }

  fn brahman() -> BreedParams {
    BreedParams::new(0.52, 145.0, 300.0, 900.0)
  }

  fn exact(a: f64, b: f64, n: usize) -> Vec<FeatureSample> {
    (0..n)
      .map(|i| {
        let area = 0.02 + 0.01 * i as f64;
        FeatureSample::new(area, a * area * AREA_SCALE + b)
      })
      .collect()
  }

  #[test]
  fn empty_feature_set_is_insufficient() {
    let engine = CalibrationEngine::new(NoDetector);
    let err = engine
      .fit(BreedId::Brahman, brahman(), &[], 3, &CancelToken::default())
      .unwrap_err();
    assert_eq!(
      err,
      CalibrationError::InsufficientData {
        breed: BreedId::Brahman,
        discarded: 3
      }
    );
  }

  #[test]
  fn undetectable_samples_are_discarded() {
    let engine = CalibrationEngine::new(NoDetector);
    let samples = vec![
      CalibrationSample {
        image_bytes: Vec::new(),
        true_weight_kg: 400.0,
        breed: BreedId::Brahman,
      };
      4
    ];
    let err = engine
      .calibrate(BreedId::Brahman, brahman(), samples, &CancelToken::default())
      .unwrap_err();
    assert!(matches!(
      err,
      CalibrationError::InsufficientData { discarded: 4, .. }
    ));
  }

  #[test]
  fn few_samples_are_flagged_low_confidence() {
    let engine = CalibrationEngine::new(NoDetector);
    let report = engine
      .fit(BreedId::Nelore, brahman(), &exact(0.5, 150.0, 3), 0, &CancelToken::default())
      .unwrap();
    assert!(report.low_confidence);
    assert!(report.cross_validation.is_none());
    assert_eq!(report.n_samples, 3);
  }

  #[test]
  fn optimum_outside_box_hits_bound() {
    let engine = CalibrationEngine::new(NoDetector);
    let report = engine
      .fit(BreedId::Angus, brahman(), &exact(0.9, 150.0, 12), 0, &CancelToken::default())
      .unwrap();
    assert!(report.bound_hit);
    assert!(report.a <= 0.7 && report.a >= 0.3);
    assert!(report.b <= 200.0 && report.b >= 100.0);
  }

  #[test]
  fn invalid_start_params_are_rejected() {
    let engine = CalibrationEngine::new(NoDetector);
    let err = engine
      .fit(
        BreedId::Angus,
        BreedParams::new(5.0, 150.0, 300.0, 900.0),
        &exact(0.5, 150.0, 10),
        0,
        &CancelToken::default(),
      )
      .unwrap_err();
    assert!(matches!(err, CalibrationError::InvalidParams(_)));
  }

  #[test]
  fn cancellation_emits_no_report() {
    let engine = CalibrationEngine::new(NoDetector);
    let cancel = CancelToken::default();
    cancel.cancel();
    let err = engine
      .fit(BreedId::Angus, brahman(), &exact(0.5, 150.0, 10), 0, &cancel)
      .unwrap_err();
    assert_eq!(err, CalibrationError::Cancelled);
  }

  #[test]
  fn reversed_search_box_is_rejected_before_fitting() {
    let config = CalibrationConfig {
      a_bounds: (0.7, 0.3),
      ..Default::default()
    };
    assert!(matches!(
      CalibrationEngine::new(NoDetector).with_config(config),
      Err(ConfigError::Invalid { field: "a_bounds", .. })
    ));

    let narrow = CalibrationConfig {
      a_bounds: (0.4, 0.6),
      b_bounds: (120.0, 180.0),
      ..Default::default()
    };
    let report = CalibrationEngine::new(NoDetector)
      .with_config(narrow)
      .unwrap()
      .fit(BreedId::Brahman, brahman(), &exact(0.55, 160.0, 12), 0, &CancelToken::default())
      .unwrap();
    assert!((report.a - 0.55).abs() < 1e-3);
    assert!((report.b - 160.0).abs() < 0.5);
  }

  #[test]
  fn proposal_keeps_weight_window() {
    let engine = CalibrationEngine::new(NoDetector);
    let report = engine
      .fit(BreedId::Brahman, brahman(), &exact(0.55, 160.0, 12), 0, &CancelToken::default())
      .unwrap();
    let proposal = report.proposal();
    assert_eq!(proposal.breed, BreedId::Brahman);
    assert_eq!((proposal.min_kg, proposal.max_kg), (300.0, 900.0));
    assert_eq!((proposal.a, proposal.b), (report.a, report.b));
  }
}
