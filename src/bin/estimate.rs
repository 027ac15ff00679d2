// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/bin/estimate.rs - 单张照片体重估计
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use niuzhong::{
  BreedId, BreedRegistry, FromUrl, HybridEstimator,
  config::EstimatorConfig,
  detector::DetectorWrapper,
  input::{ImageFileInput, decode},
  output::{OutputWrapper, Render},
};

/// Niuzhong 体重估计参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 品种（brahman, nelore, angus, cebuinas, criollo, pardo_suizo, jersey, guzerat, holstein）
  #[arg(long, value_name = "BREED")]
  pub breed: BreedId,
  /// 输入图像，例如 image:///data/cow.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 检测后端
  #[arg(long, value_name = "DETECTOR", default_value = "classic://")]
  pub detector: Url,
  /// 输出路径（image:// 标注图像或 json:// 结果文件），缺省时打印 JSON
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 推理配置文件（JSON）
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 品种参数更新记录（JSON 数组）
  #[arg(long, value_name = "FILE")]
  pub registry: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("品种: {}", args.breed);
  info!("输入来源: {}", args.input);
  info!("检测后端: {}", args.detector);

  let config = match &args.config {
    Some(path) => EstimatorConfig::from_json_file(path)?,
    None => EstimatorConfig::default(),
  };
  let (reader, writer) = BreedRegistry::shared();
  if let Some(path) = &args.registry {
    let n = writer.load_json_file(path)?;
    info!("载入 {} 条品种参数", n);
  }

  let input = ImageFileInput::from_url(&args.input)?;
  let detector = DetectorWrapper::from_url(&args.detector)?;
  let output = args.output.as_ref().map(OutputWrapper::from_url).transpose()?;
  let estimator = HybridEstimator::new(detector, reader).with_config(config)?;

  info!("开始估计...");
  let estimate = estimator.estimate(input.bytes(), args.breed)?;

  match output {
    Some(output) => {
      let config = estimator.config();
      let raster = decode(input.bytes(), config.min_pixels, config.max_pixels)?;
      output.render_result(&raster, &estimate)?;
    }
    None => println!("{}", serde_json::to_string_pretty(&estimate)?),
  }

  Ok(())
}
