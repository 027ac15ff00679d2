// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/config.rs - 推理与标定配置
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// 归一化面积进入回归前乘的系数，默认参数表即以此为单位
pub const AREA_SCALE: f64 = 10_000.0;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置格式错误: {0}")]
  FormatError(#[from] serde_json::Error),
  #[error("配置项 {field} 无效: {reason}")]
  Invalid { field: &'static str, reason: String },
}

/// 构图质量评分所用的面积带：`[full_low, full_high]` 内为 1，
/// 向外线性下降，到 `zero_low` / `zero_high` 处为 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeBand {
  pub zero_low: f64,
  pub full_low: f64,
  pub full_high: f64,
  pub zero_high: f64,
}

impl Default for SizeBand {
  fn default() -> Self {
    Self {
      zero_low: 0.01,
      full_low: 0.03,
      full_high: 0.45,
      zero_high: 0.75,
    }
  }
}

impl SizeBand {
  pub fn score(&self, area: f64) -> f64 {
    if area <= self.zero_low || area >= self.zero_high {
      0.0
    } else if area < self.full_low {
      (area - self.zero_low) / (self.full_low - self.zero_low)
    } else if area <= self.full_high {
      1.0
    } else {
      (self.zero_high - area) / (self.zero_high - self.full_high)
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
  /// 可接受的最小像素数
  pub min_pixels: u64,
  /// 可接受的最大像素数
  pub max_pixels: u64,
  /// 检测得分阈值
  pub score_threshold: f32,
  /// 归一化面积的截断区间
  pub area_clip: (f64, f64),
  pub size_band: SizeBand,
  /// 居中程度在构图评分中的权重
  pub centering_weight: f64,
  /// 回归结果被截断时置信度乘的系数
  pub clamp_confidence_factor: f64,
  pub high_confidence: f64,
  pub medium_confidence: f64,
  pub fallback_confidence: f64,
  /// 回退估计围绕品种均值的最大相对偏移
  pub fallback_jitter: f64,
}

impl Default for EstimatorConfig {
  fn default() -> Self {
    Self {
      min_pixels: 64 * 64,
      max_pixels: 16_000_000,
      score_threshold: 0.25,
      area_clip: (0.01, 0.9),
      size_band: SizeBand::default(),
      centering_weight: 0.4,
      clamp_confidence_factor: 0.7,
      high_confidence: 0.90,
      medium_confidence: 0.80,
      fallback_confidence: 0.65,
      fallback_jitter: 0.10,
    }
  }
}

impl EstimatorConfig {
  pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&text)?;
    config.validate()?;
    info!("载入推理配置: {}", path.display());
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.min_pixels == 0 || self.min_pixels >= self.max_pixels {
      return Err(ConfigError::Invalid {
        field: "min_pixels",
        reason: format!("需满足 0 < {} < {}", self.min_pixels, self.max_pixels),
      });
    }
    let (lo, hi) = self.area_clip;
    if !(lo > 0.0 && lo < hi && hi <= 1.0) {
      return Err(ConfigError::Invalid {
        field: "area_clip",
        reason: format!("需满足 0 < {} < {} <= 1", lo, hi),
      });
    }
    let band = &self.size_band;
    if !(band.zero_low < band.full_low && band.full_low <= band.full_high && band.full_high < band.zero_high)
    {
      return Err(ConfigError::Invalid {
        field: "size_band",
        reason: format!("{:?} 不是递增区间", band),
      });
    }
    for (field, value) in [
      ("score_threshold", f64::from(self.score_threshold)),
      ("centering_weight", self.centering_weight),
      ("clamp_confidence_factor", self.clamp_confidence_factor),
      ("high_confidence", self.high_confidence),
      ("medium_confidence", self.medium_confidence),
      ("fallback_confidence", self.fallback_confidence),
      ("fallback_jitter", self.fallback_jitter),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid {
          field,
          reason: format!("{} 不在 [0, 1] 内", value),
        });
      }
    }
    if self.medium_confidence > self.high_confidence {
      return Err(ConfigError::Invalid {
        field: "medium_confidence",
        reason: "不能高于 high_confidence".to_string(),
      });
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
  pub a_bounds: (f64, f64),
  pub b_bounds: (f64, f64),
  pub max_iterations: usize,
  /// 单纯形在归一化坐标下的收敛阈值
  pub tolerance: f64,
  /// 以当前最优点重启单纯形的最大次数
  pub restarts: usize,
  pub cv_folds: usize,
  /// 样本数低于该值时报告标记为低可信
  pub min_samples_warning: usize,
}

impl Default for CalibrationConfig {
  fn default() -> Self {
    Self {
      a_bounds: (0.3, 0.7),
      b_bounds: (100.0, 200.0),
      max_iterations: 2000,
      tolerance: 1e-9,
      restarts: 8,
      cv_folds: 5,
      min_samples_warning: 5,
    }
  }
}

impl CalibrationConfig {
  pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&text)?;
    config.validate()?;
    info!("载入标定配置: {}", path.display());
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (field, (lo, hi)) in [("a_bounds", self.a_bounds), ("b_bounds", self.b_bounds)] {
      if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        return Err(ConfigError::Invalid {
          field,
          reason: format!("需满足有限值 {} < {}", lo, hi),
        });
      }
    }
    if self.max_iterations == 0 {
      return Err(ConfigError::Invalid {
        field: "max_iterations",
        reason: "至少为 1".to_string(),
      });
    }
    if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
      return Err(ConfigError::Invalid {
        field: "tolerance",
        reason: format!("{} 不是正数", self.tolerance),
      });
    }
    if self.cv_folds < 2 {
      return Err(ConfigError::Invalid {
        field: "cv_folds",
        reason: format!("{} 折无法做交叉验证", self.cv_folds),
      });
    }
    Ok(())
  }
}
