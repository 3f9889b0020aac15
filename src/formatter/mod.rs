use crate::config::SavedImagesMode;
use crate::error::{Error, Result};
use crate::image;
use crate::models::{EncodedImage, History, Role, Turn, UserInput};
use crate::protocol::ChatMessage;
use tracing::{debug, warn};

/// 将会话历史和新输入转换为推理服务需要的消息列表
#[derive(Debug, Clone)]
pub struct HistoryFormatter {
    mode: SavedImagesMode,
}

impl HistoryFormatter {
    pub fn new(mode: SavedImagesMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SavedImagesMode {
        self.mode
    }

    /// 追加新输入到历史并生成请求消息列表
    ///
    /// 1. 非空文本追加为用户消息
    /// 2. 每张图片单独编码并追加为图片消息，编码失败的图片只记录日志并跳过
    /// 3. 按顺序展开历史，文本消息和图片消息各自成为独立记录
    /// 4. 本轮有图片（新附加或暂存）时按 [`SavedImagesMode`] 组装最新一轮
    ///
    /// 没有文本也没有任何图片时返回 [`Error::EmptyInput`]，历史保持不变。
    pub fn format(
        &self,
        history: &mut History,
        input: UserInput,
        saved_images: &[EncodedImage],
    ) -> Result<Vec<ChatMessage>> {
        let batch_start = history.len();

        if let Some(prompt) = input.prompt() {
            history.push(Turn::user(prompt));
        }

        let mut fresh_images = Vec::with_capacity(input.images.len());
        for source in input.images {
            if let Some(attachment) = image::try_attach(source) {
                fresh_images.push(attachment.encoded.clone());
                history.push(Turn::image(attachment));
            }
        }

        if history.len() == batch_start && saved_images.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut messages = flatten(&history.turns()[..batch_start]);
        let batch = flatten(&history.turns()[batch_start..]);

        let has_images = !fresh_images.is_empty() || !saved_images.is_empty();
        match self.mode {
            SavedImagesMode::ReplaceTrailing if has_images => {
                // 本轮全部替换为一条只含图片的消息，提示文本不随本次请求发送
                let mut images = fresh_images;
                images.extend_from_slice(saved_images);
                debug!(
                    "Replacing {} batch records with one image record ({} images)",
                    batch.len(),
                    images.len()
                );
                messages.push(ChatMessage::images(images));
            }
            SavedImagesMode::KeepPrompt if !saved_images.is_empty() => {
                messages.push(ChatMessage::images(saved_images.to_vec()));
                messages.extend(batch);
            }
            _ => messages.extend(batch),
        }

        Ok(messages)
    }
}

/// 按顺序展开历史，只有第一条系统消息会被保留
pub fn flatten(turns: &[Turn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len());
    for (index, turn) in turns.iter().enumerate() {
        match turn {
            Turn::Text {
                role: Role::System, ..
            } if index > 0 => {
                warn!("Dropping system turn at position {}", index);
            }
            Turn::Text { role, content, .. } => {
                messages.push(ChatMessage::text(*role, content.clone()));
            }
            Turn::Image { images, .. } => {
                messages.push(ChatMessage::images(images.clone()));
            }
        }
    }
    messages
}
