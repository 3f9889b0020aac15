use crate::error::{Error, Result};
use crate::models::GenerationParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 聊天适配器的主配置结构
/// 包含推理服务、会话、默认生成参数和日志等各个模块的配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Ollama 推理服务配置
    pub ollama: OllamaConfig,
    /// 会话与格式化配置
    #[serde(default)]
    pub chat: ChatConfig,
    /// 默认生成参数
    #[serde(default)]
    pub generation: GenerationParams,
    /// 翻译配置
    #[serde(default)]
    pub translate: TranslateConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ollama 服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaConfig {
    /// 服务基础URL，例如 "http://localhost:11434"
    pub base_url: String,
    /// 非流式请求（如模型列表）的超时时间，使用humantime格式（如 "5s", "30s"）
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// 建立连接的超时时间，流式请求也受其约束
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// 是否启用TCP Keep-Alive
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_keep_alive() -> bool {
    true
}

/// 会话配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatConfig {
    /// 系统提示词，为空时不发送系统消息
    pub system_prompt: Option<String>,
    /// 存在图片时如何组装最新一轮的消息
    pub saved_images_mode: SavedImagesMode,
    /// 透传给 Ollama 的 low_vram 选项
    pub low_vram: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: Some("You are a professional assistant.".to_string()),
            saved_images_mode: SavedImagesMode::ReplaceTrailing,
            low_vram: true,
        }
    }
}

/// 本轮带图片时最新用户消息的组装方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SavedImagesMode {
    /// 用一条空文本、携带全部图片的消息替换本轮的所有消息（不发送提示文本）
    ReplaceTrailing,
    /// 保留提示文本，暂存图片作为单独一条消息放在本轮消息之前
    KeepPrompt,
}

/// 翻译配置，其余生成参数沿用 `generation`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslateConfig {
    pub model: String,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            model: "llama2".to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 默认日志级别，RUST_LOG 存在时以环境变量为准
    pub level: String,
    /// 是否输出JSON格式日志
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// 从配置文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径（支持YAML、TOML、JSON等格式）
    ///
    /// # 说明
    /// 1. 首先从指定文件加载配置
    /// 2. 然后从环境变量覆盖配置（前缀为OLLAMA_CHAT，分隔符为__）
    ///    例如：OLLAMA_CHAT__OLLAMA__BASE_URL=http://gpu-box:11434 会覆盖 ollama.base_url
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("OLLAMA_CHAT").separator("__"))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.generation.validate()?;
        Ok(config)
    }

    /// 创建默认配置
    ///
    /// # 默认值
    /// - Ollama：http://localhost:11434，超时30秒，连接超时5秒
    /// - 会话：固定系统提示词，ReplaceTrailing，low_vram 开启
    /// - 生成参数：与原聊天界面滑块的默认值一致
    pub fn default() -> Self {
        Self {
            ollama: OllamaConfig {
                base_url: "http://localhost:11434".to_string(),
                timeout: Duration::from_secs(30),
                connect_timeout: default_connect_timeout(),
                keep_alive: true,
            },
            chat: ChatConfig::default(),
            generation: GenerationParams::default(),
            translate: TranslateConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
