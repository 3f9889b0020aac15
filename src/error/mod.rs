use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// 图片无法读取或编码，格式化阶段会记录日志并跳过该图片
    #[error("Encoding error for {}: {reason}", .path.display())]
    Encoding { path: PathBuf, reason: String },

    /// 没有文本也没有图片，调用方应视为空操作
    #[error("Empty input: no text and no images to send")]
    EmptyInput,

    /// 推理服务失败，消息原样展示给用户
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Invalid generation parameters: {0}")]
    InvalidParams(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// 将任意错误归类为生成错误，保留原始消息
    pub fn into_generation(self) -> Self {
        match self {
            Error::Generation(msg) => Error::Generation(msg),
            other => Error::Generation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
