// 该文件是 Wuzhi （物知） 项目的一部分。
// src/model/ssd_mobilenet.rs - SSD MobileNet v1 检测模型
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

use std::sync::Mutex;

use ort::{
  inputs,
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::SsdInputFrame,
  input::AsNhwcFrame,
  model::{Model, ModelError, SsdOutput},
};

const SSD_INPUT_NAME: &str = "image_tensor:0";
const SSD_LOCATIONS_NAME: &str = "detection_boxes:0";
const SSD_CLASSES_NAME: &str = "detection_classes:0";
const SSD_SCORES_NAME: &str = "detection_scores:0";

#[derive(Error, Debug)]
pub enum SsdMobilenetError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型输出错误: {0}")]
  OutputError(#[from] ModelError),
  #[error("推理会话不可用")]
  SessionPoisoned,
}

/// 张量名称，可通过 URL 查询参数覆盖
#[derive(Debug, Clone, PartialEq)]
struct TensorNames {
  input: String,
  locations: String,
  classes: String,
  scores: String,
}

impl Default for TensorNames {
  fn default() -> Self {
    Self {
      input: SSD_INPUT_NAME.to_string(),
      locations: SSD_LOCATIONS_NAME.to_string(),
      classes: SSD_CLASSES_NAME.to_string(),
      scores: SSD_SCORES_NAME.to_string(),
    }
  }
}

pub struct SsdMobilenetBuilder {
  model_path: String,
  names: TensorNames,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for SsdMobilenetBuilder {
  const SCHEME: &'static str = "ssd";
}

impl FromUrl for SsdMobilenetBuilder {
  type Error = SsdMobilenetError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SsdMobilenetError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut names = TensorNames::default();
    let mut intra_threads = None;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "input" => names.input = v.into_owned(),
        "locations" => names.locations = v.into_owned(),
        "classes" => names.classes = v.into_owned(),
        "scores" => names.scores = v.into_owned(),
        "threads" => {
          intra_threads = Some(v.parse().map_err(|_| {
            SsdMobilenetError::ModelPathError(format!("无效的线程数: {}", v))
          })?)
        }
        _ => {}
      }
    }

    Ok(SsdMobilenetBuilder {
      model_path: url.path().to_string(),
      names,
      intra_threads,
    })
  }
}

impl SsdMobilenetBuilder {
  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = Some(threads);
    self
  }

  pub fn build(self) -> Result<SsdMobilenet, SsdMobilenetError> {
    info!("加载模型文件: {}", self.model_path);
    let mut builder =
      Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    if let Some(threads) = self.intra_threads {
      builder = builder.with_intra_threads(threads)?;
    }
    let session = builder.commit_from_file(&self.model_path)?;
    info!("模型加载完成");

    let input_names: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
    let output_names: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
    debug!("模型输入: {:?}", input_names);
    debug!("模型输出: {:?}", output_names);

    if !input_names.contains(&self.names.input.as_str()) {
      error!("模型缺少输入张量 {}", self.names.input);
      return Err(SsdMobilenetError::ModelInvalid(format!(
        "缺少输入张量 {}, 实际输入 {:?}",
        self.names.input, input_names
      )));
    }

    for name in [
      &self.names.locations,
      &self.names.classes,
      &self.names.scores,
    ] {
      if !output_names.contains(&name.as_str()) {
        error!("模型缺少输出张量 {}", name);
        return Err(SsdMobilenetError::ModelInvalid(format!(
          "缺少输出张量 {}, 实际输出 {:?}",
          name, output_names
        )));
      }
    }

    Ok(SsdMobilenet {
      session: Mutex::new(session),
      names: self.names,
    })
  }
}

/// SSD MobileNet v1 检测器，输入为 300x300 的 NHWC u8 帧
pub struct SsdMobilenet {
  session: Mutex<Session>,
  names: TensorNames,
}

impl FromUrl for SsdMobilenet {
  type Error = SsdMobilenetError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    SsdMobilenetBuilder::from_url(url)?.build()
  }
}

impl Model for SsdMobilenet {
  type Input = SsdInputFrame;
  type Output = SsdOutput;
  type Error = SsdMobilenetError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let tensor = Tensor::from_array((input.shape(), input.as_nhwc().to_vec()))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| SsdMobilenetError::SessionPoisoned)?;

    debug!("执行模型推理");
    let outputs = session.run(inputs![self.names.input.as_str() => tensor])?;

    debug!("获取模型输出");
    let (_, locations) = outputs[self.names.locations.as_str()].try_extract_tensor::<f32>()?;
    let (_, classes) = outputs[self.names.classes.as_str()].try_extract_tensor::<f32>()?;
    let (_, scores) = outputs[self.names.scores.as_str()].try_extract_tensor::<f32>()?;

    let output = SsdOutput::new(locations.to_vec(), classes.to_vec(), scores.to_vec())?;
    debug!("模型输出检测数量: {}", output.len());
    Ok(output)
  }
}
