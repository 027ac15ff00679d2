// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/fallback.rs - 品种均值回退估计
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

use tracing::warn;

use crate::registry::BreedParams;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const JITTER_STEPS: u64 = 20_000;

/// FNV-1a 64 位散列，跨平台、跨版本稳定
fn fnv1a(bytes: &[u8]) -> u64 {
  bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
    (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
  })
}

/// 由输入字节确定的 `[-1, 1]` 偏移因子
pub fn jitter_unit(bytes: &[u8]) -> f64 {
  let step = fnv1a(bytes) % (JITTER_STEPS + 1);
  step as f64 / (JITTER_STEPS / 2) as f64 - 1.0
}

/// 品种区间中点加上确定性偏移（不超过 `jitter` 倍），并截断到品种区间内
pub fn fallback_weight(params: &BreedParams, bytes: &[u8], jitter: f64) -> f64 {
  let mid = params.midpoint_kg();
  let weight = mid * (1.0 + jitter * jitter_unit(bytes));
  warn!("使用品种均值回退估计: 中点 {:.1} kg, 结果 {:.1} kg", mid, weight);
  weight.clamp(params.min_kg, params.max_kg)
}
