// 该文件是 Wuzhi （物知） 项目的一部分。
// src/input/capture.rs - 相机拍照输入
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
use std::process::Command;

use chrono::Local;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::ImageFileInput};

/// 拍照参数中的占位符，会被替换为照片文件路径
pub const PHOTO_PATH_PLACEHOLDER: &str = "{path}";

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未指定拍照程序 (program=...)")]
  MissingProgram,
}

/// 调用外部拍照程序，把照片写入私有目录下新建的临时文件
///
/// URL 形如 `capture:///var/lib/wuzhi/photos?program=fswebcam&arg=--no-banner&arg={path}`。
pub struct CaptureInput {
  directory: PathBuf,
  program: String,
  args: Vec<String>,
  taken: bool,
}

impl FromUrlWithScheme for CaptureInput {
  const SCHEME: &'static str = "capture";
}

impl FromUrl for CaptureInput {
  type Error = CaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CaptureError::SchemeMismatch);
    }

    let mut program = None;
    let mut args = Vec::new();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "program" => program = Some(v.into_owned()),
        "arg" => args.push(v.into_owned()),
        _ => {}
      }
    }

    Ok(CaptureInput {
      directory: PathBuf::from(url.path()),
      program: program.ok_or(CaptureError::MissingProgram)?,
      args,
      taken: false,
    })
  }
}

impl CaptureInput {
  pub fn new(directory: impl Into<PathBuf>, program: impl Into<String>, args: Vec<String>) -> Self {
    Self {
      directory: directory.into(),
      program: program.into(),
      args,
      taken: false,
    }
  }

  /// 在照片目录中创建 `JPEG_<时间戳>_<随机>.jpg`
  fn create_image_file(&self) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(&self.directory)?;
    let prefix = format!("JPEG_{}_", Local::now().format("%Y%m%d_%H%M%S"));
    let file = tempfile::Builder::new()
      .prefix(&prefix)
      .suffix(".jpg")
      .tempfile_in(&self.directory)?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
  }

  fn run_program(&self, photo: &Path) -> bool {
    let photo = photo.to_string_lossy();
    let args: Vec<String> = self
      .args
      .iter()
      .map(|arg| arg.replace(PHOTO_PATH_PLACEHOLDER, &photo))
      .collect();

    info!("调用拍照程序: {} {:?}", self.program, args);
    match Command::new(&self.program).args(&args).status() {
      Ok(status) if status.success() => true,
      Ok(status) => {
        warn!("拍照已取消或失败: {}", status);
        false
      }
      Err(e) => {
        warn!("无法启动拍照程序 {}: {}", self.program, e);
        false
      }
    }
  }

  fn capture(&self) -> Option<RgbImage> {
    // 照片文件创建失败时直接放弃本次拍照，不向用户报告
    let photo = match self.create_image_file() {
      Ok(path) => path,
      Err(e) => {
        debug!("无法创建照片文件: {}", e);
        return None;
      }
    };

    if !self.run_program(&photo) {
      discard(&photo);
      return None;
    }

    match ImageFileInput::open(&photo) {
      Ok(image) => {
        info!("拍照完成: {}", photo.display());
        Some(image)
      }
      Err(e) => {
        error!("无法解码照片 {}: {}", photo.display(), e);
        discard(&photo);
        None
      }
    }
  }
}

// 拍照失败时删除预先创建的空文件
fn discard(photo: &Path) {
  if let Err(e) = std::fs::remove_file(photo) {
    debug!("无法删除照片文件 {}: {}", photo.display(), e);
  }
}

impl Iterator for CaptureInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    if self.taken {
      return None;
    }
    self.taken = true;
    self.capture()
  }
}
