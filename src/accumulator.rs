use crate::error::{Error, Result};
use crate::models::GenerationParams;
use crate::protocol::ollama::{fragment_content, fragment_error};
use crate::protocol::{ChatMessage, ChatRequest, InferenceClient};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// 流式响应累加器
///
/// 每收到一个带文本的片段就追加到缓冲区，并产出缓冲区当前的完整内容。
#[derive(Clone)]
pub struct StreamAccumulator {
    client: Arc<dyn InferenceClient>,
    low_vram: bool,
}

impl StreamAccumulator {
    pub fn new(client: Arc<dyn InferenceClient>, low_vram: bool) -> Self {
        Self { client, low_vram }
    }

    /// 发起一次生成，返回逐步变长的字符串序列
    ///
    /// 流在被轮询之前不会发起请求；提前丢弃流会释放底层连接。
    /// 任何错误都以 [`Error::Generation`] 产出，之后流立即结束，不会自动重试。
    pub fn stream(
        &self,
        payload: Vec<ChatMessage>,
        params: &GenerationParams,
    ) -> impl Stream<Item = Result<String>> + Send + 'static {
        let client = self.client.clone();
        let request = ChatRequest::streaming(payload, params, self.low_vram);
        let request_id = Uuid::new_v4();

        async_stream::stream! {
            info!(
                %request_id,
                "Generation started (model: {}, messages: {})",
                request.model,
                request.messages.len()
            );

            let mut fragments = match client.chat_stream(request).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    error!(%request_id, "Failed to open generation stream: {}", e);
                    yield Err(e.into_generation());
                    return;
                }
            };

            let mut buffer = String::new();
            let mut received = 0usize;
            let mut skipped = 0usize;

            while let Some(fragment_result) = fragments.next().await {
                let fragment = match fragment_result {
                    Ok(fragment) => fragment,
                    Err(e) => {
                        error!(%request_id, "Generation stream failed after {} bytes: {}", buffer.len(), e);
                        yield Err(e.into_generation());
                        return;
                    }
                };
                received += 1;

                if let Some(message) = fragment_error(&fragment) {
                    error!(%request_id, "Inference server reported error: {}", message);
                    yield Err(Error::Generation(message.to_string()));
                    return;
                }

                match fragment_content(&fragment) {
                    Some(content) if !content.is_empty() => {
                        buffer.push_str(content);
                        yield Ok(buffer.clone());
                    }
                    Some(_) => {}
                    None => {
                        skipped += 1;
                        debug!("Skipping fragment without message content");
                    }
                }
            }

            info!(
                %request_id,
                "Generation finished: {} fragments, {} skipped, {} bytes",
                received, skipped, buffer.len()
            );
        }
    }
}
