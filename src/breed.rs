// 该文件是 Niuzhong （牛重） 项目的一部分。
// src/breed.rs - 品种标识
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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 支持的品种，规范名为小写
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreedId {
  Brahman,
  Nelore,
  Angus,
  Cebuinas,
  Criollo,
  PardoSuizo,
  Jersey,
  Guzerat,
  Holstein,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知品种: {0}")]
pub struct BreedParseError(pub String);

impl BreedId {
  pub const ALL: [BreedId; 9] = [
    BreedId::Brahman,
    BreedId::Nelore,
    BreedId::Angus,
    BreedId::Cebuinas,
    BreedId::Criollo,
    BreedId::PardoSuizo,
    BreedId::Jersey,
    BreedId::Guzerat,
    BreedId::Holstein,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      BreedId::Brahman => "brahman",
      BreedId::Nelore => "nelore",
      BreedId::Angus => "angus",
      BreedId::Cebuinas => "cebuinas",
      BreedId::Criollo => "criollo",
      BreedId::PardoSuizo => "pardo_suizo",
      BreedId::Jersey => "jersey",
      BreedId::Guzerat => "guzerat",
      BreedId::Holstein => "holstein",
    }
  }

  /// 在参数表中的下标，与 `ALL` 的顺序一致
  pub(crate) fn index(&self) -> usize {
    *self as usize
  }
}

impl fmt::Display for BreedId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BreedId {
  type Err = BreedParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let name = s.trim().to_ascii_lowercase();
    BreedId::ALL
      .into_iter()
      .find(|breed| breed.as_str() == name)
      .ok_or_else(|| BreedParseError(s.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_is_case_insensitive() {
    assert_eq!("Brahman".parse::<BreedId>(), Ok(BreedId::Brahman));
    assert_eq!("PARDO_SUIZO".parse::<BreedId>(), Ok(BreedId::PardoSuizo));
    assert_eq!(" holstein ".parse::<BreedId>(), Ok(BreedId::Holstein));
  }

  #[test]
  fn parse_rejects_unknown_names() {
    let err = "zebu".parse::<BreedId>().unwrap_err();
    assert_eq!(err, BreedParseError("zebu".to_string()));
  }

  #[test]
  fn index_follows_declaration_order() {
    for (i, breed) in BreedId::ALL.iter().enumerate() {
      assert_eq!(breed.index(), i);
      assert_eq!(breed.as_str().parse::<BreedId>().unwrap(), *breed);
    }
  }

  #[test]
  fn serde_uses_canonical_names() {
    let json = serde_json::to_string(&BreedId::PardoSuizo).unwrap();
    assert_eq!(json, "\"pardo_suizo\"");
  }
}
