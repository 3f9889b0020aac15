pub mod ndjson;
pub mod ollama;

use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;

pub use ollama::{ChatMessage, ChatOptions, ChatRequest};

/// 推理服务返回的原始片段流，每个元素是一行解析后的 JSON
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// 推理服务的抽象，格式化器与累加器只依赖这个接口
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// 以流式模式发起对话补全，连接在流被丢弃时释放
    async fn chat_stream(&self, request: ChatRequest) -> Result<FragmentStream>;

    /// 列出可用模型名称
    async fn list_models(&self) -> Result<Vec<String>>;
}
