// 该文件是 Shanan （山南西风） 项目的一部分。
// src/algorithm/config.rs - 算法配置
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

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, algorithm::AlgorithmType};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数 {0} 无效: {1}")]
  InvalidQuery(String, String),
}

/// 阈值取值 0-100
fn parse_threshold(key: &str, value: &str) -> Result<u8, ConfigError> {
  match value.parse::<u8>() {
    Ok(v) if v <= 100 => Ok(v),
    Ok(v) => Err(ConfigError::InvalidQuery(
      key.to_string(),
      format!("{} 超出范围 0-100", v),
    )),
    Err(e) => Err(ConfigError::InvalidQuery(key.to_string(), e.to_string())),
  }
}

fn check_scheme(url: &Url, scheme: &str) -> Result<(), ConfigError> {
  if url.scheme() != scheme {
    error!(
      "URI scheme mismatch: expected '{}', found '{}'",
      scheme,
      url.scheme()
    );
    return Err(ConfigError::SchemeMismatch(url.scheme().to_string()));
  }
  Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FomoConfig {
  pub score_threshold: u8,
}

impl Default for FomoConfig {
  fn default() -> Self {
    Self { score_threshold: 80 }
  }
}

impl FromUrlWithScheme for FomoConfig {
  const SCHEME: &'static str = "fomo";
}

impl FromUrl for FomoConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;

    let mut config = Self::default();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "score" => config.score_threshold = parse_threshold(&k, &v)?,
        _ => debug!("忽略未知参数: {}={}", k, v),
      }
    }
    Ok(config)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YoloConfig {
  pub score_threshold: u8,
  pub nms_threshold: u8,
}

impl Default for YoloConfig {
  fn default() -> Self {
    Self {
      score_threshold: 40,
      nms_threshold: 45,
    }
  }
}

impl FromUrlWithScheme for YoloConfig {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for YoloConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;

    let mut config = Self::default();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "score" => config.score_threshold = parse_threshold(&k, &v)?,
        "nms" => config.nms_threshold = parse_threshold(&k, &v)?,
        _ => debug!("忽略未知参数: {}={}", k, v),
      }
    }
    Ok(config)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmConfig {
  Fomo(FomoConfig),
  Yolo(YoloConfig),
}

impl AlgorithmConfig {
  /// 给定算法类型的默认配置
  pub fn default_for(kind: AlgorithmType) -> Option<Self> {
    match kind {
      AlgorithmType::Fomo => Some(AlgorithmConfig::Fomo(FomoConfig::default())),
      AlgorithmType::Yolo => Some(AlgorithmConfig::Yolo(YoloConfig::default())),
      AlgorithmType::Undefined => None,
    }
  }

  pub fn kind(&self) -> AlgorithmType {
    match self {
      AlgorithmConfig::Fomo(_) => AlgorithmType::Fomo,
      AlgorithmConfig::Yolo(_) => AlgorithmType::Yolo,
    }
  }
}

impl FromUrl for AlgorithmConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      FomoConfig::SCHEME => FomoConfig::from_url(url).map(AlgorithmConfig::Fomo),
      YoloConfig::SCHEME => YoloConfig::from_url(url).map(AlgorithmConfig::Yolo),
      other => Err(ConfigError::SchemeMismatch(other.to_string())),
    }
  }
}
