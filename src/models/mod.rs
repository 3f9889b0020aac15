use crate::error::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 图片来源：文件路径或原始字节
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Bytes),
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&str> for ImageSource {
    fn from(path: &str) -> Self {
        ImageSource::Path(PathBuf::from(path))
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(Bytes::from(bytes))
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Path(path) => write!(f, "{}", path.display()),
            ImageSource::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Base64 编码后的图片（标准字母表，带填充）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    pub(crate) fn new(encoded: String) -> Self {
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 图片来源及其编码结果，编码可随时由来源重新计算
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub source: ImageSource,
    pub encoded: EncodedImage,
}

/// 一条对话消息
///
/// 文本消息和图片消息是两种不同的记录，发送给推理服务时不会合并。
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    Text {
        role: Role,
        content: String,
        created_at: DateTime<Utc>,
    },
    Image {
        source: ImageSource,
        images: Vec<EncodedImage>,
        created_at: DateTime<Utc>,
    },
}

impl Turn {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Turn::Text {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn image(attachment: ImageAttachment) -> Self {
        Turn::Image {
            source: attachment.source,
            images: vec![attachment.encoded],
            created_at: Utc::now(),
        }
    }

    /// 图片消息始终属于用户
    pub fn role(&self) -> Role {
        match self {
            Turn::Text { role, .. } => *role,
            Turn::Image { .. } => Role::User,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Turn::Text { created_at, .. } | Turn::Image { created_at, .. } => *created_at,
        }
    }
}

/// 会话历史，按插入顺序保存所有消息
///
/// 系统消息只能通过 [`History::with_system_prompt`] 放在第一位。
#[derive(Debug, Clone, Default)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::text(Role::System, prompt)],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// 清空对话，保留系统提示词
    pub fn reset(&mut self) {
        self.turns
            .retain(|turn| matches!(turn, Turn::Text { role: Role::System, .. }));
    }
}

/// 用户新提交的输入
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub text: Option<String>,
    pub images: Vec<ImageSource>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: impl Into<ImageSource>) -> Self {
        self.images.push(image.into());
        self
    }

    /// 去除首尾空白后的非空文本
    pub fn prompt(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// 生成参数，原样透传给推理服务
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_new_tokens: u32,
    pub repetition_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "llava".to_string(),
            temperature: 0.8,
            top_p: 0.8,
            top_k: 20,
            max_new_tokens: 1024,
            repetition_penalty: 1.0,
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::InvalidParams("model must not be empty".into()));
        }
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("repetition_penalty", self.repetition_penalty, 0.0, 2.0)?;
        if !(1..=100).contains(&self.top_k) {
            return Err(Error::InvalidParams(format!(
                "top_k must be within [1, 100], got {}",
                self.top_k
            )));
        }
        if !(1..=4096).contains(&self.max_new_tokens) {
            return Err(Error::InvalidParams(format!(
                "max_new_tokens must be within [1, 4096], got {}",
                self.max_new_tokens
            )));
        }
        Ok(())
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<()> {
    // NaN 也会落到这里
    if !(min..=max).contains(&value) {
        return Err(Error::InvalidParams(format!(
            "{name} must be within [{min}, {max}], got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_keeps_system_prompt() {
        let mut history = History::with_system_prompt("be brief");
        history.push(Turn::user("hi"));
        history.push(Turn::assistant("hello"));
        history.reset();

        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].role(), Role::System);
    }

    #[test]
    fn prompt_ignores_whitespace_only_text() {
        assert_eq!(UserInput::text("   \n").prompt(), None);
        assert_eq!(UserInput::text("  why? ").prompt(), Some("why?"));
        assert_eq!(UserInput::default().prompt(), None);
    }

    #[test]
    fn image_turn_is_user_role() {
        let turn = Turn::image(ImageAttachment {
            source: ImageSource::from("cat.png"),
            encoded: EncodedImage::new("AAAA".into()),
        });
        assert_eq!(turn.role(), Role::User);
    }

    #[test]
    fn validate_accepts_defaults_and_bounds() {
        assert!(GenerationParams::default().validate().is_ok());

        let edge = GenerationParams {
            temperature: 2.0,
            top_p: 0.0,
            top_k: 100,
            max_new_tokens: 4096,
            repetition_penalty: 0.0,
            ..GenerationParams::default()
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let cases = [
            GenerationParams {
                top_k: 0,
                ..GenerationParams::default()
            },
            GenerationParams {
                max_new_tokens: 5000,
                ..GenerationParams::default()
            },
            GenerationParams {
                top_p: 1.5,
                ..GenerationParams::default()
            },
            GenerationParams {
                temperature: f32::NAN,
                ..GenerationParams::default()
            },
            GenerationParams {
                model: " ".into(),
                ..GenerationParams::default()
            },
        ];
        for params in cases {
            assert!(matches!(params.validate(), Err(Error::InvalidParams(_))), "{params:?}");
        }
    }
}
