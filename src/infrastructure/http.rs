//! 共享 HTTP 客户端
//!
//! 统一超时、状态码检查、响应解码与传输层重试。

use std::{future::Future, time::Duration};

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::NetworkConfig,
    error::{snippet, ExplorerApiError, Result, SdkError},
};

#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(config: &NetworkConfig) -> Self {
        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            inner,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// GET 并解码 JSON
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<T> {
        self.get_json_with_headers(url, query, &[], context).await
    }

    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
        context: &str,
    ) -> Result<T> {
        let body = self
            .with_retry(url, || async move {
                let mut request = self.inner.get(url).query(query);
                for (name, value) in headers {
                    request = request.header(*name, *value);
                }
                read_body(url, request.send().await?).await
            })
            .await?;
        decode_json(context, &body)
    }

    /// POST JSON 并解码 JSON
    pub async fn post_json<B, T>(&self, url: &str, payload: &B, context: &str) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.post_json_with_headers(url, payload, &[], context).await
    }

    pub async fn post_json_with_headers<B, T>(
        &self,
        url: &str,
        payload: &B,
        headers: &[(&str, &str)],
        context: &str,
    ) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let body = self
            .with_retry(url, || async move {
                let mut request = self
                    .inner
                    .post(url)
                    .header("Content-Type", "application/json")
                    .json(payload);
                for (name, value) in headers {
                    request = request.header(*name, *value);
                }
                read_body(url, request.send().await?).await
            })
            .await?;
        decode_json(context, &body)
    }

    /// POST 纯文本（例如原始交易十六进制）并解码 JSON
    pub async fn post_text<T: DeserializeOwned>(
        &self,
        url: &str,
        text: &str,
        headers: &[(&str, &str)],
        context: &str,
    ) -> Result<T> {
        let body = self
            .with_retry(url, || async move {
                let mut request = self
                    .inner
                    .post(url)
                    .header("Content-Type", "text/plain")
                    .body(text.to_string());
                for (name, value) in headers {
                    request = request.header(*name, *value);
                }
                read_body(url, request.send().await?).await
            })
            .await?;
        decode_json(context, &body)
    }

    /// 仅对可重试错误做线性退避重试
    pub async fn with_retry<T, F, Fut>(&self, endpoint: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    tracing::warn!(
                        attempt = attempt,
                        endpoint = %endpoint,
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn read_body(url: &str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ExplorerApiError::RateLimited.into());
    }
    if !status.is_success() {
        return Err(SdkError::transport(
            url,
            format!("status {}: {}", status, snippet(&body)),
        ));
    }
    Ok(body)
}

/// 解码 JSON，失败时记录载荷片段
pub fn decode_json<T: DeserializeOwned>(context: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        tracing::warn!(context = %context, error = %e, payload = %snippet(body), "decode_failed");
        SdkError::decoding(context, body)
    })
}
