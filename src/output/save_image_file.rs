// 该文件是 Wuzhi （物知） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, output::Render, scene::DetectedObject};

/// 保存叠加绘制后的图像，`?record` 时同时写出同名 `.txt` 检测记录
pub struct SaveImageFileOutput {
  path: PathBuf,
  record: bool,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
      record: uri.query_pairs().any(|(k, _)| k == "record"),
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      record: false,
    }
  }

  pub fn with_record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;

    warn!("保存图像到文件: {}", self.path.display());

    Ok(())
  }

  fn record(&self, objects: &[DetectedObject]) -> Result<(), SaveImageFileError> {
    let records: Vec<String> = objects
      .iter()
      .map(|object| {
        let bbox = &object.bounding_box;
        format!(
          "{}, {:.1}, {:.1}, {:.1}, {:.1}",
          object.label, bbox.left, bbox.top, bbox.right, bbox.bottom
        )
      })
      .collect();

    let path = self.path.with_extension("txt");
    std::fs::write(&path, records.join("\n"))?;
    info!("检测记录写入: {}", path.display());
    Ok(())
  }
}

impl Render<RgbImage, [DetectedObject]> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbImage, result: &[DetectedObject]) -> Result<(), Self::Error> {
    self.save_image(frame)?;
    if self.record {
      self.record(result)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scene::BoundingBox;
  use image::Rgb;

  #[test]
  fn saves_image_and_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/out.png");
    let output = SaveImageFileOutput::new(&path).with_record(true);

    let image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
    let objects = vec![DetectedObject {
      bounding_box: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
      label: "cup".into(),
    }];
    output.render_result(&image, objects.as_slice()).unwrap();

    assert!(path.exists());
    let record = std::fs::read_to_string(path.with_extension("txt")).unwrap();
    assert_eq!(record, "cup, 1.0, 2.0, 3.0, 4.0");
  }

  #[test]
  fn record_flag_from_query() {
    let url = Url::parse("image:///tmp/out.png?record").unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert!(output.record);
    assert_eq!(output.path(), Path::new("/tmp/out.png"));
  }
}
