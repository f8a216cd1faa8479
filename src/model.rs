// 该文件是 Wuzhi （物知） 项目的一部分。
// src/model.rs - 模型
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

use thiserror::Error;
use tracing::{debug, info};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("输出张量长度不一致: locations={locations}, classes={classes}, scores={scores}")]
  ShapeMismatch {
    locations: usize,
    classes: usize,
    scores: usize,
  },
  #[error("标签文件读取错误: {0}")]
  LabelIoError(#[from] std::io::Error),
}

/// SSD 模型的一次推理输出
///
/// 三个序列按检测下标对齐：`classes[i]`、`scores[i]` 对应
/// `locations[4i..4i+4]`，其中坐标顺序为归一化的 (top, left, bottom, right)。
#[derive(Debug, Clone, PartialEq)]
pub struct SsdOutput {
  locations: Box<[f32]>,
  classes: Box<[f32]>,
  scores: Box<[f32]>,
}

impl SsdOutput {
  pub fn new(locations: Vec<f32>, classes: Vec<f32>, scores: Vec<f32>) -> Result<Self, ModelError> {
    if locations.len() != scores.len() * 4 || classes.len() != scores.len() {
      return Err(ModelError::ShapeMismatch {
        locations: locations.len(),
        classes: classes.len(),
        scores: scores.len(),
      });
    }

    Ok(Self {
      locations: locations.into_boxed_slice(),
      classes: classes.into_boxed_slice(),
      scores: scores.into_boxed_slice(),
    })
  }

  /// 检测数量（由模型输出张量大小决定）
  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }

  pub fn location(&self, index: usize) -> [f32; 4] {
    let loc = &self.locations[index * 4..index * 4 + 4];
    [loc[0], loc[1], loc[2], loc[3]]
  }

  /// 模型输出的原始类别值
  pub fn class(&self, index: usize) -> f32 {
    self.classes[index]
  }

  /// 负数或非有限的类别值没有对应的编号
  pub fn class_id(&self, index: usize) -> Option<usize> {
    let class = self.classes[index];
    if !class.is_finite() || class < 0.0 {
      return None;
    }
    Some(class as usize)
  }

  pub fn score(&self, index: usize) -> f32 {
    self.scores[index]
  }

  pub fn scores(&self) -> &[f32] {
    &self.scores
  }
}

/// 按类别编号索引的标签表，启动时加载一次
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
  labels: Box<[String]>,
}

impl LabelTable {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let table = Self::parse(&content);
    debug!("标签数量: {}", table.len());
    Ok(table)
  }

  /// 每行一个标签，空行跳过
  pub fn parse(content: &str) -> Self {
    let labels = content
      .lines()
      .map(|line| line.trim_end_matches('\r'))
      .filter(|line| !line.trim().is_empty())
      .map(str::to_string)
      .collect();
    Self { labels }
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.labels.get(class_id).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}

#[cfg(feature = "model_ssd_mobilenet")]
mod ssd_mobilenet;
#[cfg(feature = "model_ssd_mobilenet")]
pub use self::ssd_mobilenet::{SsdMobilenet, SsdMobilenetBuilder, SsdMobilenetError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_triple_must_align() {
    let ok = SsdOutput::new(vec![0.0; 8], vec![1.0, 2.0], vec![0.9, 0.1]);
    assert!(ok.is_ok());

    let bad = SsdOutput::new(vec![0.0; 7], vec![1.0, 2.0], vec![0.9, 0.1]);
    assert!(matches!(
      bad,
      Err(ModelError::ShapeMismatch {
        locations: 7,
        classes: 2,
        scores: 2
      })
    ));

    let bad = SsdOutput::new(vec![0.0; 8], vec![1.0], vec![0.9, 0.1]);
    assert!(bad.is_err());
  }

  #[test]
  fn location_slices_by_detection() {
    let output = SsdOutput::new(
      vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8],
      vec![3.0, 17.0],
      vec![0.9, 0.8],
    )
    .unwrap();

    assert_eq!(output.len(), 2);
    assert_eq!(output.location(1), [0.5, 0.6, 0.7, 0.8]);
    assert_eq!(output.class_id(1), Some(17));
  }

  #[test]
  fn invalid_class_has_no_id() {
    let output = SsdOutput::new(vec![0.0; 8], vec![-1.0, f32::NAN], vec![0.9, 0.9]).unwrap();
    assert_eq!(output.class_id(0), None);
    assert_eq!(output.class_id(1), None);
  }

  #[test]
  fn labels_skip_blank_lines() {
    let table = LabelTable::parse("???\r\nperson\n\nbicycle\n   \ncar\n");
    assert_eq!(table.len(), 4);
    assert_eq!(table.get(0), Some("???"));
    assert_eq!(table.get(1), Some("person"));
    assert_eq!(table.get(3), Some("car"));
    assert_eq!(table.get(4), None);
  }

  #[test]
  fn labels_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.txt");
    std::fs::write(&path, "background\nteddy bear\n").unwrap();

    let table = LabelTable::from_file(&path).unwrap();
    assert_eq!(table.get(1), Some("teddy bear"));
  }
}
