// 该文件是 Wuzhi （物知） 项目的一部分。
// src/bin/detect_explore.rs - 检测后点击物体查询说明
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

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;

use anyhow::Result;
use clap::Parser;
use url::Url;

use tracing::{info, warn};
use wuzhi::{
  FromUrl,
  input::{ImageFileInput, InputWrapper},
  model::{LabelTable, SsdMobilenet},
  output::{OutputWrapper, draw::Overlay},
  summary::{DEFAULT_ENDPOINT, WikipediaSummary},
  task::{ExploreEvent, ExploreTask, Task, parse_tap},
};

/// Wuzhi 检测并查询物体信息
///
/// 检测完成后从标准输入逐行读取点击坐标 `x y`（原图像素坐标），
/// 或 `open <图像路径>` 以检测另一张图像。
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
  /// 摘要查询服务地址
  #[arg(long, default_value = DEFAULT_ENDPOINT, value_name = "URL")]
  pub endpoint: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("标签文件路径: {}", args.labels.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("查询服务: {}", args.endpoint);

  let labels = LabelTable::from_file(&args.labels)?;
  let overlay = Overlay::default()
    .with_threshold(args.confidence)
    .with_font_or_system(args.font.as_deref())?;
  let source = WikipediaSummary::with_endpoint(args.endpoint)?;
  let input = InputWrapper::from_url(&args.input)?;
  let model = SsdMobilenet::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let task = ExploreTask::new(labels, overlay, source);

  let quit = task.sender();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = quit.send(ExploreEvent::Quit);
  })?;

  let taps = task.sender();
  thread::spawn(move || {
    for line in std::io::stdin().lock().lines() {
      let Ok(line) = line else {
        break;
      };
      let line = line.trim();
      if line.is_empty() {
        continue;
      }
      if let Some(path) = line.strip_prefix("open ") {
        match ImageFileInput::open(path.trim()) {
          Ok(image) => {
            if taps.send(ExploreEvent::Image(image)).is_err() {
              return;
            }
          }
          Err(e) => warn!("无法打开图像 {}: {}", path.trim(), e),
        }
        continue;
      }
      match parse_tap(line) {
        Some(event) => {
          if taps.send(event).is_err() {
            return;
          }
        }
        None => warn!("无法解析点击坐标: {}", line),
      }
    }
    let _ = taps.send(ExploreEvent::TapsClosed);
  });

  let shown = task.run_task(input, model, output)?;
  info!("共显示 {} 条物体信息", shown.len());

  Ok(())
}
