// 该文件是 Wuzhi （物知） 项目的一部分。
// src/summary/wikipedia.rs - 维基百科摘要查询
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

use std::time::Duration;

use reqwest::{StatusCode, blocking::Client};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use super::{DEFAULT_ENDPOINT, FETCH_ERROR, SummarySource, interpret_response, summary_url};

/// 连接与读取超时
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum SummaryError {
  #[error("HTTP 请求错误: {0}")]
  HttpError(#[from] reqwest::Error),
  #[error("URL 错误: {0}")]
  UrlError(#[from] url::ParseError),
}

/// 维基百科 REST 摘要接口，单次 GET，不重试
pub struct WikipediaSummary {
  client: Client,
  endpoint: Url,
}

impl WikipediaSummary {
  pub fn new() -> Result<Self, SummaryError> {
    Self::with_endpoint(Url::parse(DEFAULT_ENDPOINT)?)
  }

  pub fn with_endpoint(endpoint: Url) -> Result<Self, SummaryError> {
    let client = Client::builder()
      .connect_timeout(FETCH_TIMEOUT)
      .timeout(FETCH_TIMEOUT)
      .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self { client, endpoint })
  }

  fn try_fetch(&self, label: &str) -> Result<String, SummaryError> {
    let url = summary_url(&self.endpoint, label)?;
    debug!("GET {}", url);

    let response = self.client.get(url).send()?;
    let status = response.status();
    if status != StatusCode::OK {
      return Ok(interpret_response(status.as_u16(), ""));
    }

    let body = response.text()?;
    Ok(interpret_response(status.as_u16(), &body))
  }
}

impl SummarySource for WikipediaSummary {
  fn fetch(&self, label: &str) -> String {
    match self.try_fetch(label) {
      Ok(text) => text,
      Err(e) => {
        error!("查询 {} 失败: {}", label, e);
        FETCH_ERROR.to_string()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::summary::NO_INFORMATION;
  use std::io::{BufRead, BufReader, Write};
  use std::net::TcpListener;
  use std::sync::mpsc;
  use std::thread;

  /// 在本地端口上回应一次固定的 HTTP 响应，并返回收到的请求行
  fn serve_once(status: &'static str, body: &'static str) -> (Url, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
      let (stream, _) = listener.accept().unwrap();
      let mut reader = BufReader::new(stream.try_clone().unwrap());
      let mut request_line = String::new();
      reader.read_line(&mut request_line).unwrap();
      loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
          break;
        }
      }

      let mut stream = stream;
      write!(
        stream,
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
      )
      .unwrap();
      stream.flush().unwrap();
      tx.send(request_line.trim_end().to_string()).unwrap();
    });

    (Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap(), rx)
  }

  #[test]
  fn fetches_extract() {
    let (endpoint, requests) = serve_once("200 OK", r#"{"extract":"A soft toy bear."}"#);
    let source = WikipediaSummary::with_endpoint(endpoint).unwrap();

    assert_eq!(source.fetch("teddy bear"), "A soft toy bear.");
    assert_eq!(
      requests.recv().unwrap(),
      "GET /api/rest_v1/page/summary/teddy%20bear HTTP/1.1"
    );
  }

  #[test]
  fn missing_extract_falls_back() {
    let (endpoint, _requests) = serve_once("200 OK", r#"{"title":"Kite"}"#);
    let source = WikipediaSummary::with_endpoint(endpoint).unwrap();
    assert_eq!(source.fetch("kite"), NO_INFORMATION);
  }

  #[test]
  fn non_200_reports_status() {
    let (endpoint, _requests) = serve_once("404 Not Found", r#"{"type":"not_found"}"#);
    let source = WikipediaSummary::with_endpoint(endpoint).unwrap();
    assert_eq!(source.fetch("???"), "Error: 404");
  }

  #[test]
  fn connection_failure_is_reported_as_text() {
    // 绑定后立即释放端口，连接会被拒绝
    let port = TcpListener::bind("127.0.0.1:0")
      .unwrap()
      .local_addr()
      .unwrap()
      .port();
    let endpoint = Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap();
    let source = WikipediaSummary::with_endpoint(endpoint).unwrap();
    assert_eq!(source.fetch("dog"), FETCH_ERROR);
  }
}
