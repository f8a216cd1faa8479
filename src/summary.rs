// 该文件是 Wuzhi （物知） 项目的一部分。
// src/summary.rs - 物体信息查询
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

use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
  mpsc::Sender,
};
use std::thread;

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

/// 返回内容中没有摘要字段时显示的文字
pub const NO_INFORMATION: &str = "No information available.";
/// 请求失败时显示的文字
pub const FETCH_ERROR: &str = "Error fetching information.";

pub const DEFAULT_ENDPOINT: &str = "https://en.wikipedia.org";
const SUMMARY_PATH: &str = "api/rest_v1/page/summary";

#[cfg(feature = "summary_fetch")]
mod wikipedia;
#[cfg(feature = "summary_fetch")]
pub use self::wikipedia::{SummaryError, WikipediaSummary};

/// 根据标签获取一段说明文字，失败时返回固定的提示文字而不是错误
pub trait SummarySource: Send + Sync + 'static {
  fn fetch(&self, label: &str) -> String;
}

/// `{endpoint}/api/rest_v1/page/summary/{label}`，标签按百分号编码
pub fn summary_url(endpoint: &Url, label: &str) -> Result<Url, url::ParseError> {
  Url::parse(&format!(
    "{}/{}/{}",
    endpoint.as_str().trim_end_matches('/'),
    SUMMARY_PATH,
    urlencoding::encode(label)
  ))
}

/// 把 HTTP 状态码与响应体转换为显示文字
pub fn interpret_response(status: u16, body: &str) -> String {
  if status != 200 {
    return format!("Error: {}", status);
  }

  match serde_json::from_str::<Value>(body) {
    Ok(Value::Object(map)) => match map.get("extract") {
      Some(Value::String(extract)) => extract.clone(),
      _ => NO_INFORMATION.to_string(),
    },
    Ok(other) => {
      warn!("响应不是 JSON 对象: {}", other);
      FETCH_ERROR.to_string()
    }
    Err(e) => {
      warn!("响应 JSON 解析失败: {}", e);
      FETCH_ERROR.to_string()
    }
  }
}

/// 查询代数计数器
///
/// 每次发起查询或重新检测都会推进代数，只有持有当前代数的结果才会被显示。
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
  pub fn current(&self) -> u64 {
    self.0.load(Ordering::SeqCst)
  }

  pub fn advance(&self) -> u64 {
    self.0.fetch_add(1, Ordering::SeqCst) + 1
  }

  pub fn is_current(&self, ticket: u64) -> bool {
    self.current() == ticket
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
  pub ticket: u64,
  pub label: String,
  pub text: String,
}

/// 每次点击在独立线程中查询，结果通过通道送回事件循环
pub struct SummaryDispatcher<S, E> {
  source: Arc<S>,
  generation: Generation,
  sender: Sender<E>,
}

impl<S, E> SummaryDispatcher<S, E>
where
  S: SummarySource,
  E: From<SummaryOutcome> + Send + 'static,
{
  pub fn new(source: S, sender: Sender<E>) -> Self {
    Self {
      source: Arc::new(source),
      generation: Generation::default(),
      sender,
    }
  }

  pub fn generation(&self) -> Generation {
    self.generation.clone()
  }

  /// 使所有进行中的查询失效
  pub fn invalidate(&self) {
    let ticket = self.generation.advance();
    debug!("查询代数推进到 {}", ticket);
  }

  pub fn dispatch(&self, label: &str) -> u64 {
    let ticket = self.generation.advance();
    let source = Arc::clone(&self.source);
    let generation = self.generation.clone();
    let sender = self.sender.clone();
    let label = label.to_string();

    info!("查询物体信息: {} (第 {} 次)", label, ticket);
    thread::spawn(move || {
      let text = source.fetch(&label);
      if !generation.is_current(ticket) {
        debug!("丢弃过期的查询结果: {} (第 {} 次)", label, ticket);
        return;
      }
      if sender.send(SummaryOutcome { ticket, label, text }.into()).is_err() {
        debug!("事件循环已退出，查询结果被丢弃");
      }
    });

    ticket
  }
}

/// 当前显示的说明文字
#[derive(Debug)]
pub struct SummaryPanel {
  generation: Generation,
  text: Option<String>,
}

impl SummaryPanel {
  pub fn new(generation: Generation) -> Self {
    Self {
      generation,
      text: None,
    }
  }

  /// 仅接受当前代数的结果，返回是否已显示
  pub fn accept(&mut self, outcome: SummaryOutcome) -> bool {
    if !self.generation.is_current(outcome.ticket) {
      debug!(
        "忽略过期的查询结果: {} (第 {} 次)",
        outcome.label, outcome.ticket
      );
      return false;
    }
    self.text = Some(outcome.text);
    true
  }

  pub fn text(&self) -> Option<&str> {
    self.text.as_deref()
  }
}
