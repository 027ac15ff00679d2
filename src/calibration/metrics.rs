// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/calibration/metrics.rs - 拟合误差指标
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

use crate::config::AREA_SCALE;

/// 缓存的单个样本特征
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSample {
  pub normalized_area: f64,
  pub true_weight_kg: f64,
}

impl FeatureSample {
  pub fn new(normalized_area: f64, true_weight_kg: f64) -> Self {
    Self {
      normalized_area,
      true_weight_kg,
    }
  }

  /// 未截断的回归预测值
  pub fn predict(&self, a: f64, b: f64) -> f64 {
    a * (self.normalized_area * AREA_SCALE) + b
  }

  pub fn residual(&self, a: f64, b: f64) -> f64 {
    self.predict(a, b) - self.true_weight_kg
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
  pub mae: f64,
  pub rmse: f64,
  pub r2: f64,
}

/// 标定损失：平均绝对误差
pub fn mean_absolute_error(a: f64, b: f64, samples: &[FeatureSample]) -> f64 {
  if samples.is_empty() {
    return f64::INFINITY;
  }
  samples.iter().map(|s| s.residual(a, b).abs()).sum::<f64>() / samples.len() as f64
}

pub fn evaluate(a: f64, b: f64, samples: &[FeatureSample]) -> FitMetrics {
  let n = samples.len() as f64;
  let mae = mean_absolute_error(a, b, samples);
  let ss_res: f64 = samples.iter().map(|s| s.residual(a, b).powi(2)).sum();
  let rmse = (ss_res / n).sqrt();

  let mean = samples.iter().map(|s| s.true_weight_kg).sum::<f64>() / n;
  let ss_tot: f64 = samples
    .iter()
    .map(|s| (s.true_weight_kg - mean).powi(2))
    .sum();
  // 真值全相同时 R² 无定义，完全拟合记为 1，否则记为 0
  let r2 = if ss_tot > 0.0 {
    1.0 - ss_res / ss_tot
  } else if ss_res == 0.0 {
    1.0
  } else {
    0.0
  };

  FitMetrics { mae, rmse, r2 }
}

/// 最小二乘解 `(a, b)`，作为优化起点；横坐标无变化时返回 `None`
pub fn least_squares(samples: &[FeatureSample]) -> Option<(f64, f64)> {
  let n = samples.len() as f64;
  if samples.len() < 2 {
    return None;
  }
  let xs = samples.iter().map(|s| s.normalized_area * AREA_SCALE);
  let mean_x = xs.clone().sum::<f64>() / n;
  let mean_y = samples.iter().map(|s| s.true_weight_kg).sum::<f64>() / n;
  let (sxx, sxy) = xs
    .zip(samples)
    .fold((0.0, 0.0), |(sxx, sxy), (x, s)| {
      let dx = x - mean_x;
      (sxx + dx * dx, sxy + dx * (s.true_weight_kg - mean_y))
    });
  if sxx <= f64::EPSILON {
    return None;
  }
  let a = sxy / sxx;
  Some((a, mean_y - a * mean_x))
}

/// k 折交叉验证的汇总误差（各折留出残差合并计算）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
  pub folds: usize,
  pub mae: f64,
  pub rmse: f64,
}

/// 按下标取模划分折，保证结果可复现
pub fn fold_split(samples: &[FeatureSample], folds: usize, fold: usize) -> (Vec<FeatureSample>, Vec<FeatureSample>) {
  samples
    .iter()
    .enumerate()
    .fold((Vec::new(), Vec::new()), |(mut train, mut test), (i, s)| {
      if i % folds == fold {
        test.push(*s);
      } else {
        train.push(*s);
      }
      (train, test)
    })
}
