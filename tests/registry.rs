// 该文件是 Niuzhong （牛重） 项目的一部分。
// tests/registry.rs - 参数表并发更新测试
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

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use approx::assert_relative_eq;
use niuzhong::{
  BreedId, BreedParams, BreedRegistry, HybridEstimator, RegistryWriter,
  detector::{DetectItem, DetectResult, Detector, SilhouetteLabel},
  frame::RgbRaster,
  registry::{RegistryError, RegistryUpdate},
};

use common::plain_png;

const S2: BreedParams = BreedParams::new(0.60, 150.0, 280.0, 850.0);

/// 推理过程中由写端替换参数的检测器
struct UpdatingDetector {
  writer: RegistryWriter,
  fired: AtomicBool,
}

impl Detector for UpdatingDetector {
  type Label = SilhouetteLabel;
  type Error = RegistryError;

  fn infer(&self, _: &RgbRaster) -> Result<DetectResult<Self::Label>, Self::Error> {
    if !self.fired.swap(true, Ordering::SeqCst) {
      self.writer.update(BreedId::Nelore, S2)?;
    }
    Ok(
      vec![DetectItem {
        kind: SilhouetteLabel::Cattle,
        score: 0.85,
        bbox: [130.0, 80.0, 170.0, 120.0],
        mask_area_px: None,
      }]
      .into(),
    )
  }
}

#[test]
fn in_flight_call_keeps_its_snapshot() {
  let (reader, writer) = BreedRegistry::shared();
  let estimator = HybridEstimator::new(
    UpdatingDetector {
      writer: writer.clone(),
      fired: AtomicBool::new(false),
    },
    reader.clone(),
  );
  let bytes = plain_png();

  let during = estimator.estimate(&bytes, BreedId::Nelore).unwrap();
  assert_relative_eq!(during.weight_kg, 0.50 * 400.0 + 150.0, epsilon = 1e-9);
  assert_eq!(reader.get(BreedId::Nelore), S2);

  let after = estimator.estimate(&bytes, BreedId::Nelore).unwrap();
  assert_relative_eq!(after.weight_kg, 0.60 * 400.0 + 150.0, epsilon = 1e-9);
}

#[test]
fn readers_never_observe_partial_params() {
  let (reader, writer) = BreedRegistry::shared();
  let old = reader.get(BreedId::Angus);
  let new = BreedParams::new(0.65, 180.0, 300.0, 1000.0);

  std::thread::scope(|s| {
    s.spawn(|| {
      for i in 0..2000 {
        let params = if i % 2 == 0 { new } else { old };
        writer.update(BreedId::Angus, params).unwrap();
      }
    });
    for _ in 0..4 {
      s.spawn(|| {
        for _ in 0..2000 {
          let seen = reader.get(BreedId::Angus);
          assert!(seen == old || seen == new, "{:?}", seen);
          let snapshot = reader.snapshot();
          assert_eq!(snapshot.get(BreedId::Jersey), reader.get(BreedId::Jersey));
        }
      });
    }
  });
}

#[test]
fn invalid_batch_leaves_registry_untouched() {
  let registry = BreedRegistry::with_defaults();
  let before = registry.snapshot();
  let json = r#"[
    {"breed": "brahman", "a": 0.60, "b": 150, "min_kg": 300, "max_kg": 900},
    {"breed": "jersey", "a": 0.45, "b": 138, "min_kg": 600, "max_kg": 200}
  ]"#;
  assert!(matches!(
    registry.apply_json(json),
    Err(RegistryError::InvalidParams { .. })
  ));
  assert_eq!(*registry.snapshot(), *before);
}

#[test]
fn exported_records_restore_a_registry() {
  let source = BreedRegistry::with_defaults();
  source
    .update(BreedId::Guzerat, BreedParams::new(0.57, 152.0, 260.0, 760.0))
    .unwrap();
  let json = serde_json::to_string(&source.snapshot().to_updates()).unwrap();

  let (reader, writer) = BreedRegistry::shared();
  assert_eq!(writer.apply_json(&json).unwrap(), 9);
  assert_eq!(*reader.snapshot(), *source.snapshot());
}

#[test]
fn batch_update_is_published_in_one_swap() {
  let (reader, writer) = BreedRegistry::shared();
  let old = [reader.get(BreedId::Angus), reader.get(BreedId::Jersey)];
  let new = [
    BreedParams::new(0.65, 180.0, 300.0, 1000.0),
    BreedParams::new(0.60, 160.0, 250.0, 700.0),
  ];
  let batch = |[angus, jersey]: [BreedParams; 2]| {
    serde_json::to_string(&[
      RegistryUpdate::new(BreedId::Angus, angus),
      RegistryUpdate::new(BreedId::Jersey, jersey),
    ])
    .unwrap()
  };
  let (old_json, new_json) = (batch(old), batch(new));

  std::thread::scope(|s| {
    s.spawn(|| {
      for i in 0..1000 {
        let json = if i % 2 == 0 { &new_json } else { &old_json };
        assert_eq!(writer.apply_json(json).unwrap(), 2);
      }
    });
    for _ in 0..4 {
      s.spawn(|| {
        for _ in 0..2000 {
          let snapshot = reader.snapshot();
          let seen = [snapshot.get(BreedId::Angus), snapshot.get(BreedId::Jersey)];
          assert!(seen == old || seen == new, "{:?}", seen);
        }
      });
    }
  });
}
