use crate::models::{EncodedImage, GenerationParams, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: ChatOptions,
}

impl ChatRequest {
    pub fn streaming(messages: Vec<ChatMessage>, params: &GenerationParams, low_vram: bool) -> Self {
        Self {
            model: params.model.clone(),
            messages,
            stream: true,
            options: ChatOptions::from_params(params, low_vram),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<EncodedImage>>,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: None,
        }
    }

    /// 专用的图片消息，文本为空
    pub fn images(images: Vec<EncodedImage>) -> Self {
        Self {
            role: Role::User,
            content: String::new(),
            images: Some(images),
        }
    }
}

/// Ollama 的 options 字段，参数不做任何转换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub num_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_vram: Option<bool>,
}

impl ChatOptions {
    pub fn from_params(params: &GenerationParams, low_vram: bool) -> Self {
        Self {
            num_predict: params.max_new_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            repeat_penalty: params.repetition_penalty,
            low_vram: low_vram.then_some(true),
        }
    }
}

/// 从片段中取出 `message.content`，结构不符时返回 None
pub fn fragment_content(fragment: &Value) -> Option<&str> {
    fragment.get("message")?.get("content")?.as_str()
}

/// Ollama 在流中返回的错误对象 `{"error": "..."}`
pub fn fragment_error(fragment: &Value) -> Option<&str> {
    fragment.get("error")?.as_str()
}

/// `GET /api/tags` 的响应
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub model: Option<String>,
    pub name: Option<String>,
}

impl ModelEntry {
    pub fn id(&self) -> Option<&str> {
        self.model.as_deref().or(self.name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::encode_bytes;
    use serde_json::json;

    #[test]
    fn request_serializes_options_verbatim() {
        let params = GenerationParams {
            model: "llama3".into(),
            temperature: 0.5,
            top_p: 0.75,
            top_k: 40,
            max_new_tokens: 256,
            repetition_penalty: 1.5,
        };
        let request = ChatRequest::streaming(
            vec![ChatMessage::text(Role::User, "hi")],
            &params,
            true,
        );

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "llama3",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": true,
                "options": {
                    "num_predict": 256,
                    "temperature": 0.5,
                    "top_p": 0.75,
                    "top_k": 40,
                    "repeat_penalty": 1.5,
                    "low_vram": true
                }
            })
        );
    }

    #[test]
    fn image_message_has_empty_content() {
        let message = ChatMessage::images(vec![encode_bytes(b"hello")]);
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"role": "user", "content": "", "images": ["aGVsbG8="]})
        );
    }

    #[test]
    fn extracts_content_only_from_well_formed_fragments() {
        assert_eq!(
            fragment_content(&json!({"message": {"role": "assistant", "content": "Hel"}})),
            Some("Hel")
        );
        assert_eq!(fragment_content(&json!({"done": true})), None);
        assert_eq!(fragment_content(&json!({"message": {"content": 5}})), None);
        assert_eq!(fragment_error(&json!({"error": "model not found"})), Some("model not found"));
    }

    #[test]
    fn model_entry_falls_back_to_name() {
        let tags: TagsResponse = serde_json::from_value(json!({
            "models": [{"model": "llava:latest"}, {"name": "phi3:mini"}, {}]
        }))
        .unwrap();
        let ids: Vec<_> = tags.models.iter().filter_map(ModelEntry::id).collect();
        assert_eq!(ids, vec!["llava:latest", "phi3:mini"]);
    }
}
