use crate::accumulator::StreamAccumulator;
use crate::error::{Error, Result};
use crate::models::{GenerationParams, Role};
use crate::protocol::{ChatMessage, InferenceClient};
use futures::StreamExt;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

const TRANSLATOR_PROMPT: &str = "You are a professional translator.";

/// 支持的翻译目标语言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetLanguage {
    Turkish,
    Spanish,
    Chinese,
}

impl TargetLanguage {
    pub const ALL: [TargetLanguage; 3] = [
        TargetLanguage::Turkish,
        TargetLanguage::Spanish,
        TargetLanguage::Chinese,
    ];

    /// 展示给用户的名称，也用于提示词末尾的 "<名称> translation:"
    pub fn label(&self) -> &'static str {
        match self {
            TargetLanguage::Turkish => "Turkish",
            TargetLanguage::Spanish => "Spanish",
            TargetLanguage::Chinese => "Chinese",
        }
    }

    /// 提示词中要求的目标语言全称
    pub fn prompt_name(&self) -> &'static str {
        match self {
            TargetLanguage::Chinese => "Chinese (Simplified)",
            other => other.label(),
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TargetLanguage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        TargetLanguage::ALL
            .into_iter()
            .find(|language| language.label().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                let supported: Vec<_> = TargetLanguage::ALL.iter().map(|l| l.label()).collect();
                Error::InvalidParams(format!(
                    "unsupported target language '{}', expected one of: {}",
                    name,
                    supported.join(", ")
                ))
            })
    }
}

/// 英文翻译器
///
/// 与聊天共用同一个推理客户端，但不保留历史：每次调用只发送系统提示词和一条用户消息，
/// 并等待流结束后返回完整译文。
pub struct Translator {
    accumulator: StreamAccumulator,
    params: GenerationParams,
}

impl Translator {
    pub fn new(client: Arc<dyn InferenceClient>, params: GenerationParams, low_vram: bool) -> Self {
        Self {
            accumulator: StreamAccumulator::new(client, low_vram),
            params,
        }
    }

    pub fn model(&self) -> &str {
        &self.params.model
    }

    /// 构造 [system, user] 两条消息
    pub fn payload(text: &str, language: TargetLanguage) -> Vec<ChatMessage> {
        let prompt = format!(
            "Translate the following English text to {}:\n\nEnglish: {}\n\n{} translation:",
            language.prompt_name(),
            text,
            language.label()
        );
        vec![
            ChatMessage::text(Role::System, TRANSLATOR_PROMPT),
            ChatMessage::text(Role::User, prompt),
        ]
    }

    /// 翻译一段英文文本，返回流结束时的完整译文
    ///
    /// 空白文本返回 [`Error::EmptyInput`]；生成失败时返回 [`Error::Generation`]，
    /// 已收到的部分译文会被丢弃。
    pub async fn translate(&self, text: &str, language: TargetLanguage) -> Result<String> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput);
        }
        self.params.validate()?;

        info!(
            "Translating {} chars to {} with '{}'",
            text.len(),
            language,
            self.params.model
        );
        let stream = self
            .accumulator
            .stream(Self::payload(text, language), &self.params);
        futures::pin_mut!(stream);

        let mut translation = String::new();
        while let Some(item) = stream.next().await {
            translation = item?;
        }

        debug!("Translation finished ({} bytes)", translation.len());
        Ok(translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChatRequest, FragmentStream};
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// 按脚本回复的假客户端，同时记录收到的请求
    struct ScriptedClient {
        fragments: Mutex<Option<Vec<Result<Value>>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        fn new(fragments: Vec<Result<Value>>) -> Arc<Self> {
            Arc::new(Self {
                fragments: Mutex::new(Some(fragments)),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        async fn chat_stream(&self, request: ChatRequest) -> Result<FragmentStream> {
            self.requests.lock().unwrap().push(request);
            let fragments = self.fragments.lock().unwrap().take().unwrap_or_default();
            Ok(Box::pin(stream::iter(fragments)))
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec!["llama2".to_string()])
        }
    }

    fn content(text: &str) -> Result<Value> {
        Ok(json!({"message": {"role": "assistant", "content": text}, "done": false}))
    }

    fn translator(client: Arc<ScriptedClient>) -> Translator {
        let params = GenerationParams {
            model: "llama2".into(),
            ..GenerationParams::default()
        };
        Translator::new(client, params, false)
    }

    #[tokio::test]
    async fn folds_stream_into_final_translation() {
        let client = ScriptedClient::new(vec![
            content("Hola, "),
            content("mundo"),
            Ok(json!({"message": {"content": ""}, "done": true})),
        ]);
        let translator = translator(client.clone());

        let translation = translator
            .translate("Hello, world", TargetLanguage::Spanish)
            .await
            .unwrap();
        assert_eq!(translation, "Hola, mundo");

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "llama2");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, "You are a professional translator.");
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(
            request.messages[1].content,
            "Translate the following English text to Spanish:\n\nEnglish: Hello, world\n\nSpanish translation:"
        );
    }

    #[tokio::test]
    async fn generation_failure_discards_partial_translation() {
        let client = ScriptedClient::new(vec![
            content("Merhaba"),
            Err(Error::Generation("connection reset".into())),
        ]);
        let translator = translator(client);

        let err = translator
            .translate("Hello", TargetLanguage::Turkish)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(msg) if msg == "connection reset"));
    }

    #[tokio::test]
    async fn blank_text_is_not_sent() {
        let client = ScriptedClient::new(vec![content("unused")]);
        let translator = translator(client.clone());

        let err = translator
            .translate("  \n", TargetLanguage::Chinese)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn chinese_prompt_asks_for_simplified() {
        let payload = Translator::payload("Good morning", TargetLanguage::Chinese);
        assert_eq!(
            payload[1].content,
            "Translate the following English text to Chinese (Simplified):\n\nEnglish: Good morning\n\nChinese translation:"
        );
        assert!(payload.iter().all(|message| message.images.is_none()));
    }

    #[test]
    fn parses_language_names() {
        assert_eq!("spanish".parse::<TargetLanguage>().unwrap(), TargetLanguage::Spanish);
        assert_eq!(" Turkish ".parse::<TargetLanguage>().unwrap(), TargetLanguage::Turkish);
        assert_eq!("CHINESE".parse::<TargetLanguage>().unwrap(), TargetLanguage::Chinese);
        assert!(matches!(
            "Klingon".parse::<TargetLanguage>(),
            Err(Error::InvalidParams(msg)) if msg.contains("Turkish, Spanish, Chinese")
        ));
    }
}
