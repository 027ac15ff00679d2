// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/bin/calibrate.rs - 品种回归系数标定
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

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{Parser, error::ErrorKind};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use niuzhong::{
  BreedId, BreedRegistry, CancelToken, FromUrl,
  calibration::{CalibrationEngine, CalibrationError},
  config::{CalibrationConfig, ConfigError, EstimatorConfig},
  detector::{DetectorError, DetectorWrapper},
  registry::RegistryError,
};

const EXIT_UNEXPECTED: u8 = 1;
const EXIT_INSUFFICIENT_DATA: u8 = 2;
const EXIT_BAD_ARGUMENTS: u8 = 3;

/// Niuzhong 标定参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 待标定的品种
  #[arg(long, value_name = "BREED")]
  pub breed: BreedId,
  /// 照片目录，需包含 weights.json
  #[arg(long, value_name = "DIR")]
  pub photos_dir: PathBuf,
  /// 标定报告输出文件，缺省时打印到标准输出
  #[arg(long, value_name = "FILE")]
  pub output: Option<PathBuf>,
  /// 参数表更新建议输出文件
  #[arg(long, value_name = "FILE")]
  pub proposal: Option<PathBuf>,
  /// 检测后端
  #[arg(long, value_name = "DETECTOR", default_value = "classic://")]
  pub detector: Url,
  /// 推理配置文件（JSON）
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 标定配置文件（JSON），包含搜索框与优化参数
  #[arg(long, value_name = "FILE")]
  pub calibration_config: Option<PathBuf>,
  /// 起始品种参数（JSON 数组）
  #[arg(long, value_name = "FILE")]
  pub registry: Option<PathBuf>,
}

#[derive(Error, Debug)]
#[error("参数错误: {0}")]
struct BadArguments(String);

/// 参数、配置与起始参数表的问题都归为参数错误
fn exit_code(e: &anyhow::Error) -> u8 {
  if let Some(e) = e.downcast_ref::<CalibrationError>() {
    return match e {
      CalibrationError::InsufficientData { .. } => EXIT_INSUFFICIENT_DATA,
      CalibrationError::InvalidParams(_) => EXIT_BAD_ARGUMENTS,
      _ => EXIT_UNEXPECTED,
    };
  }
  if e.is::<BadArguments>()
    || e.is::<DetectorError>()
    || e.is::<ConfigError>()
    || e.is::<RegistryError>()
  {
    return EXIT_BAD_ARGUMENTS;
  }
  EXIT_UNEXPECTED
}

fn run(args: Args) -> Result<()> {
  info!("品种: {}", args.breed);
  info!("照片目录: {}", args.photos_dir.display());
  info!("检测后端: {}", args.detector);

  if !args.photos_dir.is_dir() {
    return Err(BadArguments(format!("{} 不是目录", args.photos_dir.display())).into());
  }
  let detector = DetectorWrapper::from_url(&args.detector)?;
  let config = match &args.config {
    Some(path) => EstimatorConfig::from_json_file(path)?,
    None => EstimatorConfig::default(),
  };
  let calibration_config = match &args.calibration_config {
    Some(path) => CalibrationConfig::from_json_file(path)?,
    None => CalibrationConfig::default(),
  };
  let (reader, writer) = BreedRegistry::shared();
  if let Some(path) = &args.registry {
    let n = writer.load_json_file(path)?;
    info!("载入 {} 条品种参数", n);
  }
  let start = reader.get(args.breed);
  let engine = CalibrationEngine::new(detector)
    .with_estimator_config(config)?
    .with_config(calibration_config)?;

  let cancel = CancelToken::new();
  {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
      warn!("收到中断信号，取消标定");
      cancel.cancel();
    })?;
  }

  let report = engine.calibrate_photo_dir(&args.photos_dir, args.breed, start, &cancel)?;

  let json = serde_json::to_string_pretty(&report)?;
  match &args.output {
    Some(path) => {
      std::fs::write(path, json + "\n")?;
      info!("标定报告已写入 {}", path.display());
    }
    None => println!("{}", json),
  }
  if let Some(path) = &args.proposal {
    std::fs::write(path, serde_json::to_string_pretty(&report.proposal())? + "\n")?;
    info!("参数更新建议已写入 {}", path.display());
  }

  Ok(())
}

fn main() -> ExitCode {
  tracing_subscriber::fmt::init();

  let args = match Args::try_parse() {
    Ok(args) => args,
    Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
    Err(e) => {
      // 打印失败时无处可报
      let _ = e.print();
      return ExitCode::from(EXIT_BAD_ARGUMENTS);
    }
  };

  match run(args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("标定失败: {:#}", e);
      ExitCode::from(exit_code(&e))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(photos_dir: PathBuf, detector: &str) -> Args {
    Args::try_parse_from([
      "calibrate",
      "--breed",
      "angus",
      "--photos-dir",
      photos_dir.to_str().unwrap(),
      "--detector",
      detector,
    ])
    .unwrap()
  }

  #[test]
  fn missing_photo_dir_is_a_bad_argument() {
    let dir = tempfile::tempdir().unwrap();
    let e = run(args(dir.path().join("nowhere"), "classic://")).unwrap_err();
    assert!(e.is::<BadArguments>());
    assert_eq!(exit_code(&e), EXIT_BAD_ARGUMENTS);
  }

  #[test]
  fn unknown_detector_scheme_is_a_bad_argument() {
    let dir = tempfile::tempdir().unwrap();
    let e = run(args(dir.path().to_path_buf(), "yolo://localhost")).unwrap_err();
    assert!(e.is::<DetectorError>());
    assert_eq!(exit_code(&e), EXIT_BAD_ARGUMENTS);
  }

  #[test]
  fn errors_map_to_exit_codes() {
    let insufficient = CalibrationError::InsufficientData {
      breed: BreedId::Angus,
      discarded: 4,
    };
    assert_eq!(exit_code(&insufficient.into()), EXIT_INSUFFICIENT_DATA);

    let bad_start = CalibrationError::InvalidParams(RegistryError::InvalidParams {
      breed: "angus".to_string(),
      reason: "a 超出范围".to_string(),
    });
    assert_eq!(exit_code(&bad_start.into()), EXIT_BAD_ARGUMENTS);
    assert_eq!(
      exit_code(&RegistryError::Io("registry.json".to_string()).into()),
      EXIT_BAD_ARGUMENTS
    );
    let invalid = ConfigError::Invalid {
      field: "a_bounds",
      reason: "反向区间".to_string(),
    };
    assert_eq!(exit_code(&invalid.into()), EXIT_BAD_ARGUMENTS);

    assert_eq!(exit_code(&CalibrationError::Cancelled.into()), EXIT_UNEXPECTED);
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "report.json");
    assert_eq!(exit_code(&io.into()), EXIT_UNEXPECTED);
  }
}
