use crate::config::OllamaConfig;
use crate::error::{Error, Result};
use crate::protocol::ollama::{ModelEntry, TagsResponse};
use crate::protocol::{ndjson, ChatRequest, FragmentStream, InferenceClient};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{error, info};

/// Ollama HTTP 客户端
pub struct OllamaClient {
    base_url: String,
    client: Client,
    // 流式请求专用，没有全局超时，避免长回答被截断
    streaming_client: Client,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let keepalive = if config.keep_alive {
            Some(Duration::from_secs(30))
        } else {
            None
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(keepalive)
            .build()
            .map_err(Error::Http)?;

        let streaming_client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(keepalive)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            streaming_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // 非成功状态码时读取响应体作为错误信息
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        // Ollama 的错误体形如 {"error": "model 'x' not found"}
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);

        error!("Ollama error response (status {}): {}", status, message);
        Err(Error::Generation(format!(
            "Ollama returned error status {}: {}",
            status, message
        )))
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn chat_stream(&self, request: ChatRequest) -> Result<FragmentStream> {
        info!(
            "chat_stream: start -> {} (model: {}, messages: {})",
            self.base_url,
            request.model,
            request.messages.len()
        );

        let response = self
            .streaming_client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("HTTP client connection failed (stream): {:?}", e);
                Error::Generation(e.to_string())
            })?;
        let response = Self::check_status(response).await?;

        info!("chat_stream: established (status {})", response.status());
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::Http));
        Ok(Box::pin(ndjson::decode(bytes)))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self.client.get(self.url("/api/tags")).send().await?;
        let response = Self::check_status(response).await?;
        let tags: TagsResponse = response.json().await?;

        let names: Vec<String> = tags
            .models
            .iter()
            .filter_map(ModelEntry::id)
            .map(str::to_string)
            .collect();
        info!("Found {} models at {}", names.len(), self.base_url);
        Ok(names)
    }
}
