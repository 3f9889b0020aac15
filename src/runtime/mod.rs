use crate::accumulator::StreamAccumulator;
use crate::client::OllamaClient;
use crate::config::Config;
use crate::error::Result;
use crate::formatter::HistoryFormatter;
use crate::models::{GenerationParams, History};
use crate::protocol::InferenceClient;
use crate::session::ChatSession;
use crate::translate::Translator;
use std::sync::Arc;
use tracing::{info, warn};

/// 进程级依赖，启动时构建一次，之后只读
///
/// 推理客户端和模型列表都在这里初始化，再注入到每个会话中。
pub struct Runtime {
    config: Config,
    client: Arc<dyn InferenceClient>,
    models: Vec<String>,
}

impl Runtime {
    /// 连接 Ollama 并获取模型列表；列表获取失败时以空列表继续
    pub async fn connect(config: Config) -> Result<Self> {
        let client: Arc<dyn InferenceClient> = Arc::new(OllamaClient::new(&config.ollama)?);
        Ok(Self::with_client(config, client).await)
    }

    pub async fn with_client(config: Config, client: Arc<dyn InferenceClient>) -> Self {
        let models = match client.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!("Failed to list models, continuing without a model list: {}", e);
                Vec::new()
            }
        };
        info!("Runtime ready with {} models", models.len());

        Self {
            config,
            client,
            models,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// 新建会话，系统提示词来自配置
    pub fn new_session(&self) -> ChatSession {
        let history = match &self.config.chat.system_prompt {
            Some(prompt) if !prompt.trim().is_empty() => History::with_system_prompt(prompt.clone()),
            _ => History::new(),
        };

        ChatSession::new(
            history,
            HistoryFormatter::new(self.config.chat.saved_images_mode),
            StreamAccumulator::new(self.client.clone(), self.config.chat.low_vram),
        )
    }

    /// 翻译器使用独立的模型，其余生成参数与聊天默认值相同
    pub fn translator(&self) -> Translator {
        let params = GenerationParams {
            model: self.config.translate.model.clone(),
            ..self.config.generation.clone()
        };
        Translator::new(self.client.clone(), params, self.config.chat.low_vram)
    }
}
