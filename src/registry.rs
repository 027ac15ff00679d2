// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/registry.rs - 品种参数表
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

//! 品种参数表。
//!
//! 参数表是进程内唯一的共享可变状态，采用写时复制：读者拿到当前快照的 `Arc`
//! 后整个调用期间持有；写者构造新快照后原子替换指针，旧快照在最后一个读者释放前一直有效。

use std::{path::Path, sync::Arc};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::breed::BreedId;

/// 回归系数 `a` 的合法范围
pub const PARAM_A_RANGE: (f64, f64) = (0.1, 1.0);
/// 回归截距 `b` 的合法范围
pub const PARAM_B_RANGE: (f64, f64) = (50.0, 300.0);
/// 体重上限（千克）
pub const MAX_WEIGHT_KG: f64 = 1200.0;

/// 单个品种的仿射回归参数与体重区间
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreedParams {
  pub a: f64,
  pub b: f64,
  pub min_kg: f64,
  pub max_kg: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
  #[error("品种 {breed} 参数无效: {reason}")]
  InvalidParams { breed: String, reason: String },
  #[error("无法读取参数文件: {0}")]
  Io(String),
  #[error("参数文件格式错误: {0}")]
  Format(String),
}

impl BreedParams {
  pub const fn new(a: f64, b: f64, min_kg: f64, max_kg: f64) -> Self {
    Self {
      a,
      b,
      min_kg,
      max_kg,
    }
  }

  /// 体重区间中点，回退估计的基准
  pub fn midpoint_kg(&self) -> f64 {
    (self.min_kg + self.max_kg) / 2.0
  }

  pub fn validate(&self, breed: BreedId) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidParams {
      breed: breed.to_string(),
      reason,
    };

    let (a_lo, a_hi) = PARAM_A_RANGE;
    if !(a_lo..=a_hi).contains(&self.a) {
      return Err(invalid(format!("a = {} 不在 [{}, {}] 内", self.a, a_lo, a_hi)));
    }
    let (b_lo, b_hi) = PARAM_B_RANGE;
    if !(b_lo..=b_hi).contains(&self.b) {
      return Err(invalid(format!("b = {} 不在 [{}, {}] 内", self.b, b_lo, b_hi)));
    }
    // NaN 在下面的比较中全部为 false
    if !(self.min_kg > 0.0 && self.min_kg < self.max_kg && self.max_kg <= MAX_WEIGHT_KG) {
      return Err(invalid(format!(
        "体重区间 [{}, {}] 需满足 0 < min_kg < max_kg <= {}",
        self.min_kg, self.max_kg, MAX_WEIGHT_KG
      )));
    }
    Ok(())
  }
}

/// 各品种出厂参数，顺序与 `BreedId::ALL` 一致
pub const DEFAULT_PARAMS: [(BreedId, BreedParams); 9] = [
  (BreedId::Brahman, BreedParams::new(0.52, 145.0, 300.0, 900.0)),
  (BreedId::Nelore, BreedParams::new(0.50, 150.0, 280.0, 850.0)),
  (BreedId::Angus, BreedParams::new(0.58, 135.0, 250.0, 850.0)),
  (BreedId::Cebuinas, BreedParams::new(0.51, 148.0, 290.0, 880.0)),
  (BreedId::Criollo, BreedParams::new(0.48, 140.0, 220.0, 650.0)),
  (BreedId::PardoSuizo, BreedParams::new(0.55, 142.0, 260.0, 800.0)),
  (BreedId::Jersey, BreedParams::new(0.45, 138.0, 200.0, 600.0)),
  (BreedId::Guzerat, BreedParams::new(0.50, 148.0, 250.0, 750.0)),
  (BreedId::Holstein, BreedParams::new(0.53, 140.0, 220.0, 600.0)),
];

/// 参数表更新的传输格式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegistryUpdate {
  pub breed: BreedId,
  pub a: f64,
  pub b: f64,
  pub min_kg: f64,
  pub max_kg: f64,
}

impl RegistryUpdate {
  pub fn new(breed: BreedId, params: BreedParams) -> Self {
    Self {
      breed,
      a: params.a,
      b: params.b,
      min_kg: params.min_kg,
      max_kg: params.max_kg,
    }
  }

  pub fn params(&self) -> BreedParams {
    BreedParams::new(self.a, self.b, self.min_kg, self.max_kg)
  }
}

/// 参数表的不可变快照
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySnapshot {
  params: [BreedParams; 9],
}

impl Default for RegistrySnapshot {
  fn default() -> Self {
    Self {
      params: DEFAULT_PARAMS.map(|(_, params)| params),
    }
  }
}

impl RegistrySnapshot {
  pub fn get(&self, breed: BreedId) -> BreedParams {
    self.params[breed.index()]
  }

  fn with(&self, breed: BreedId, params: BreedParams) -> Self {
    let mut next = self.clone();
    next.params[breed.index()] = params;
    next
  }

  pub fn to_updates(&self) -> Vec<RegistryUpdate> {
    BreedId::ALL
      .into_iter()
      .map(|breed| RegistryUpdate::new(breed, self.get(breed)))
      .collect()
  }
}

pub struct BreedRegistry {
  current: ArcSwap<RegistrySnapshot>,
}

impl Default for BreedRegistry {
  fn default() -> Self {
    Self::with_defaults()
  }
}

impl BreedRegistry {
  pub fn with_defaults() -> Self {
    Self {
      current: ArcSwap::from_pointee(RegistrySnapshot::default()),
    }
  }

  /// 构造共享参数表，返回读、写两个句柄
  pub fn shared() -> (RegistryReader, RegistryWriter) {
    let registry = Arc::new(Self::with_defaults());
    (
      RegistryReader(registry.clone()),
      RegistryWriter(registry),
    )
  }

  pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
    self.current.load_full()
  }

  pub fn get(&self, breed: BreedId) -> BreedParams {
    self.current.load().get(breed)
  }

  /// 原子替换单个品种的参数，校验失败时参数表保持不变
  pub fn update(&self, breed: BreedId, params: BreedParams) -> Result<(), RegistryError> {
    if let Err(e) = params.validate(breed) {
      warn!("拒绝参数更新: {}", e);
      return Err(e);
    }
    self.current.rcu(|current| current.with(breed, params));
    info!(
      "品种 {} 参数已更新: a={}, b={}, 区间=[{}, {}]",
      breed, params.a, params.b, params.min_kg, params.max_kg
    );
    Ok(())
  }

  pub fn apply(&self, update: &RegistryUpdate) -> Result<(), RegistryError> {
    self.update(update.breed, update.params())
  }

  /// 把 JSON 数组中的全部更新记录折叠进一个快照后一次替换；
  /// 任意一条无效时不应用任何记录，读端不会看到只应用了一部分的批次
  pub fn apply_json(&self, json: &str) -> Result<usize, RegistryError> {
    let updates: Vec<RegistryUpdate> =
      serde_json::from_str(json).map_err(|e| RegistryError::Format(e.to_string()))?;
    for update in &updates {
      if let Err(e) = update.params().validate(update.breed) {
        warn!("拒绝批量参数更新: {}", e);
        return Err(e);
      }
    }
    self.current.rcu(|current| {
      updates
        .iter()
        .fold(RegistrySnapshot::clone(current), |next, update| {
          next.with(update.breed, update.params())
        })
    });
    info!("批量更新 {} 条品种参数", updates.len());
    Ok(updates.len())
  }

  pub fn load_json_file(&self, path: &Path) -> Result<usize, RegistryError> {
    let text = std::fs::read_to_string(path)
      .map_err(|e| RegistryError::Io(format!("{}: {}", path.display(), e)))?;
    let count = self.apply_json(&text)?;
    info!("从 {} 载入 {} 条品种参数", path.display(), count);
    Ok(count)
  }
}

/// 只读句柄，推理端持有
#[derive(Clone)]
pub struct RegistryReader(Arc<BreedRegistry>);

impl RegistryReader {
  pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
    self.0.snapshot()
  }

  pub fn get(&self, breed: BreedId) -> BreedParams {
    self.0.get(breed)
  }
}

/// 写句柄，标定结果经操作员确认后通过它写入
#[derive(Clone)]
pub struct RegistryWriter(Arc<BreedRegistry>);

impl RegistryWriter {
  pub fn update(&self, breed: BreedId, params: BreedParams) -> Result<(), RegistryError> {
    self.0.update(breed, params)
  }

  pub fn apply(&self, update: &RegistryUpdate) -> Result<(), RegistryError> {
    self.0.apply(update)
  }

  pub fn apply_json(&self, json: &str) -> Result<usize, RegistryError> {
    self.0.apply_json(json)
  }

  pub fn load_json_file(&self, path: &Path) -> Result<usize, RegistryError> {
    self.0.load_json_file(path)
  }

  pub fn reader(&self) -> RegistryReader {
    RegistryReader(self.0.clone())
  }
}
