// 该文件是 Wuzhi （物知） 项目的一部分。
// src/task.rs - 检测与查询任务
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

use std::sync::mpsc::{Receiver, Sender, channel};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  frame::SsdInputFrame,
  model::{LabelTable, Model, SsdOutput},
  output::{
    Render,
    draw::{Annotated, Overlay},
  },
  scene::{DetectedObject, Scene},
  summary::{SummaryDispatcher, SummaryOutcome, SummaryPanel, SummarySource},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 预处理、推理并在原图上叠加检测结果
pub fn detect_and_render<M, ME>(
  image: &RgbImage,
  model: &M,
  labels: &LabelTable,
  overlay: &Overlay,
) -> anyhow::Result<Annotated>
where
  ME: std::error::Error + Sync + Send + 'static,
  M: Model<Input = SsdInputFrame, Output = SsdOutput, Error = ME>,
{
  let frame = SsdInputFrame::resize_from(image);

  info!("开始推理...");
  let now = std::time::Instant::now();
  let result = model.infer(&frame)?;
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  let annotated = overlay.render(image, &result, labels)?;
  for object in annotated.objects.iter() {
    info!(
      "  - {} at ({:.0}, {:.0}, {:.0}, {:.0})",
      object.label,
      object.bounding_box.left,
      object.bounding_box.top,
      object.bounding_box.right,
      object.bounding_box.bottom
    );
  }
  Ok(annotated)
}

/// 获取一张图像，检测并输出
pub struct OneShotTask {
  labels: LabelTable,
  overlay: Overlay,
}

impl OneShotTask {
  pub fn new(labels: LabelTable, overlay: Overlay) -> Self {
    Self { labels, overlay }
  }

  /// 检测一张图像并输出叠加结果
  fn detect<ME, RE, M, O>(
    &self,
    image: &RgbImage,
    model: &M,
    output: &O,
  ) -> anyhow::Result<Vec<DetectedObject>>
  where
    ME: std::error::Error + Sync + Send + 'static,
    RE: std::error::Error + Sync + Send + 'static,
    M: Model<Input = SsdInputFrame, Output = SsdOutput, Error = ME>,
    O: Render<RgbImage, [DetectedObject], Error = RE>,
  {
    info!("图像获取成功: {}x{}", image.width(), image.height());

    let annotated = detect_and_render(image, model, &self.labels, &self.overlay)?;
    info!("检测到 {} 个物体", annotated.objects.len());

    output.render_result(&annotated.image, annotated.objects.as_slice())?;
    info!("渲染完成");

    Ok(annotated.objects)
  }
}

impl<ME, RE, I, M, O> Task<I, M, O> for OneShotTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model<Input = SsdInputFrame, Output = SsdOutput, Error = ME>,
  O: Render<RgbImage, [DetectedObject], Error = RE>,
{
  /// 未获取到图像（例如拍照被取消）时为 `None`
  type Output = Option<Scene>;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let Some(image) = input.next() else {
      warn!("没有获取到图像，任务结束");
      return Ok(None);
    };

    let objects = self.detect(&image, &model, &output)?;
    Ok(Some(Scene::new(objects)))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExploreEvent {
  /// 图像像素坐标上的一次点击
  Tap { x: f32, y: f32 },
  /// 新选择或新拍摄的图像，重新检测并替换当前结果
  Image(RgbImage),
  /// 不会再有新的点击
  TapsClosed,
  Summary(SummaryOutcome),
  Quit,
}

impl From<SummaryOutcome> for ExploreEvent {
  fn from(outcome: SummaryOutcome) -> Self {
    ExploreEvent::Summary(outcome)
  }
}

/// 解析 `x y` 或 `x,y` 形式的点击坐标
pub fn parse_tap(line: &str) -> Option<ExploreEvent> {
  let mut parts = line
    .split(|c: char| c == ',' || c.is_whitespace())
    .filter(|part| !part.is_empty());
  let x = parts.next()?.parse().ok()?;
  let y = parts.next()?.parse().ok()?;
  if parts.next().is_some() {
    return None;
  }
  Some(ExploreEvent::Tap { x, y })
}

type Display = Box<dyn FnMut(&SummaryOutcome)>;

/// 检测后进入事件循环：点击命中物体时在后台查询说明文字
pub struct ExploreTask<S> {
  oneshot: OneShotTask,
  source: S,
  sender: Sender<ExploreEvent>,
  events: Receiver<ExploreEvent>,
  display: Display,
}

impl<S: SummarySource> ExploreTask<S> {
  pub fn new(labels: LabelTable, overlay: Overlay, source: S) -> Self {
    let (sender, events) = channel();
    Self {
      oneshot: OneShotTask::new(labels, overlay),
      source,
      sender,
      events,
      display: Box::new(|outcome| println!("[{}] {}", outcome.label, outcome.text)),
    }
  }

  /// 用于从其他线程投递点击与退出事件
  pub fn sender(&self) -> Sender<ExploreEvent> {
    self.sender.clone()
  }

  pub fn with_display(mut self, display: impl FnMut(&SummaryOutcome) + 'static) -> Self {
    self.display = Box::new(display);
    self
  }
}

impl<S, ME, RE, I, M, O> Task<I, M, O> for ExploreTask<S>
where
  S: SummarySource,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model<Input = SsdInputFrame, Output = SsdOutput, Error = ME>,
  O: Render<RgbImage, [DetectedObject], Error = RE>,
{
  /// 依次显示过的查询结果
  type Output = Vec<SummaryOutcome>;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    let ExploreTask {
      oneshot,
      source,
      sender,
      events,
      mut display,
    } = self;

    info!("开始任务...");
    let Some(image) = input.next() else {
      warn!("没有获取到图像，任务结束");
      return Ok(Vec::new());
    };
    let mut scene = Scene::new(oneshot.detect(&image, &model, &output)?);

    let dispatcher = SummaryDispatcher::new(source, sender);
    let generation = dispatcher.generation();
    let mut panel = SummaryPanel::new(generation.clone());
    let mut shown = Vec::new();
    let mut pending: Option<u64> = None;
    let mut taps_closed = false;

    info!("等待点击...");
    loop {
      // 点击输入结束且没有待显示的查询时退出
      if taps_closed && pending.is_none_or(|ticket| !generation.is_current(ticket)) {
        break;
      }

      let Ok(event) = events.recv() else {
        break;
      };

      match event {
        ExploreEvent::Tap { x, y } => match scene.hit_test(x, y) {
          Some(object) => {
            debug!("点击 ({}, {}) 命中 {}", x, y, object.label);
            pending = Some(dispatcher.dispatch(&object.label));
          }
          None => debug!("点击 ({}, {}) 未命中任何物体", x, y),
        },
        ExploreEvent::Image(image) => {
          let objects = oneshot.detect(&image, &model, &output)?;
          scene.replace(objects);
          // 旧图像上发起的查询全部作废
          dispatcher.invalidate();
          pending = None;
          info!("第 {} 次检测完成", scene.generation());
        }
        ExploreEvent::Summary(outcome) => {
          let ticket = outcome.ticket;
          if panel.accept(outcome.clone()) {
            display(&outcome);
            shown.push(outcome);
            if pending == Some(ticket) {
              pending = None;
            }
          }
        }
        ExploreEvent::TapsClosed => {
          debug!("点击输入已结束");
          taps_closed = true;
        }
        ExploreEvent::Quit => {
          info!("收到退出信号");
          break;
        }
      }
    }

    info!("任务完成，退出");
    Ok(shown)
  }
}
