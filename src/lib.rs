// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/lib.rs - 库主文件
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

//! 单张照片牛只活重估测。
//!
//! 推理流程: `bytes → decode → detect → extract feature → regress(breed params) → clamp → score`，
//! 检测失败时退化为品种均值估计。离线标定子系统按品种拟合回归系数 `(a, b)`，
//! 只给出建议，由操作员显式接受后才写入参数表。

pub mod breed;
pub mod calibration;
pub mod cancel;
pub mod config;
pub mod detector;
pub mod estimator;
pub mod fallback;
pub mod features;
pub mod frame;
pub mod input;
pub mod output;
pub mod registry;

pub use breed::BreedId;
pub use cancel::CancelToken;
pub use estimator::{EstimateError, HybridEstimator, WeightEstimate};
pub use registry::{BreedParams, BreedRegistry, RegistryReader, RegistryWriter};

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}
