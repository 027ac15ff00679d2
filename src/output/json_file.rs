// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/output/json_file.rs - 保存估计结果为 JSON 文件
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

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, estimator::WeightEstimate, frame::RgbRaster, output::Render,
};

#[derive(Error, Debug)]
pub enum JsonFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerdeError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub struct JsonFileOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonFileOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonFileOutput {
  type Error = JsonFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }
    Ok(Self::new(uri.path()))
  }
}

impl JsonFileOutput {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<RgbRaster, WeightEstimate> for JsonFileOutput {
  type Error = JsonFileError;

  fn render_result(&self, _frame: &RgbRaster, result: &WeightEstimate) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(&self.path)?);
    serde_json::to_writer_pretty(&mut writer, result)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!("估计结果已写入 {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    breed::BreedId,
    estimator::{ConfidenceLevel, EstimationMethod},
  };

  #[test]
  fn writes_estimate_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/result.json");
    let output = JsonFileOutput::new(&path);
    let estimate = WeightEstimate {
      breed: BreedId::Jersey,
      weight_kg: 400.0,
      confidence: 0.65,
      confidence_level: ConfidenceLevel::Low,
      method: EstimationMethod::Fallback,
      bbox: None,
      normalized_area: None,
      detection_confidence: None,
      size_penalty: None,
      detection_quality: None,
      clamped: false,
      processing_time_ms: 1,
      meets_quality_criteria: false,
    };
    output
      .render_result(&RgbRaster::with_shape(2, 2), &estimate)
      .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let back: WeightEstimate = serde_json::from_str(&text).unwrap();
    assert_eq!(back, estimate);
  }
}
