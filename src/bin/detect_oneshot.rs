// 该文件是 Wuzhi （物知） 项目的一部分。
// src/bin/detect_oneshot.rs - 单张图像检测
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
use url::Url;

use tracing::info;
use wuzhi::{
  FromUrl,
  input::InputWrapper,
  model::{LabelTable, SsdMobilenet},
  output::{OutputWrapper, draw::Overlay},
  task::{OneShotTask, Task},
};

/// Wuzhi 单张图像检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，如 ssd:///models/ssd_mobilenet_v1.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 标签文件，每行一个类别名
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,
  /// 输入来源，如 image:///photos/a.jpg 或 capture:///photos?program=...
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，如 image:///out/a.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 标签字体文件，缺省时查找系统字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("标签文件路径: {}", args.labels.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.confidence);

  let labels = LabelTable::from_file(&args.labels)?;
  let overlay = Overlay::default()
    .with_threshold(args.confidence)
    .with_font_or_system(args.font.as_deref())?;
  let input = InputWrapper::from_url(&args.input)?;
  let model = SsdMobilenet::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  match OneShotTask::new(labels, overlay).run_task(input, model, output)? {
    Some(scene) => {
      println!("检测到 {} 个物体", scene.objects().len());
      for object in scene.objects() {
        let bbox = &object.bounding_box;
        println!(
          "  - {} at ({:.0}, {:.0}, {:.0}, {:.0})",
          object.label, bbox.left, bbox.top, bbox.right, bbox.bottom
        );
      }
    }
    None => println!("没有获取到图像"),
  }

  Ok(())
}
