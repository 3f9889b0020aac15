use crate::accumulator::StreamAccumulator;
use crate::config::SavedImagesMode;
use crate::error::{Error, Result};
use crate::formatter::HistoryFormatter;
use crate::image;
use crate::models::{EncodedImage, GenerationParams, History, ImageSource, Turn, UserInput};
use futures::{Stream, StreamExt};
use tracing::{debug, info};

/// 单个聊天会话
///
/// 会话独占历史和暂存图片列表。[`ChatSession::submit`] 返回的流以可变借用持有会话，
/// 因此生成过程中无法修改历史；助手回复在流结束后由流本身写入历史。
pub struct ChatSession {
    history: History,
    saved_images: Vec<EncodedImage>,
    formatter: HistoryFormatter,
    accumulator: StreamAccumulator,
}

impl ChatSession {
    pub fn new(
        history: History,
        formatter: HistoryFormatter,
        accumulator: StreamAccumulator,
    ) -> Self {
        debug!(
            "New chat session ({} turns, saved images mode: {:?})",
            history.len(),
            formatter.mode()
        );
        Self {
            history,
            saved_images: Vec::new(),
            formatter,
            accumulator,
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn saved_images(&self) -> &[EncodedImage] {
        &self.saved_images
    }

    /// 暂存一张图片，之后的提问会一并携带
    ///
    /// 与提问时附带的图片不同，这里的编码失败会直接返回给调用方。
    pub fn save_image(&mut self, source: ImageSource) -> Result<()> {
        if let ImageSource::Path(path) = &source {
            if path.as_os_str().is_empty() {
                return Err(Error::EmptyInput);
            }
        }
        let encoded = image::encode(&source)?;
        self.saved_images.push(encoded);
        info!("Saved image {} ({} saved)", source, self.saved_images.len());
        Ok(())
    }

    pub fn clear_saved_images(&mut self) {
        debug!("Clearing {} saved images", self.saved_images.len());
        self.saved_images.clear();
    }

    /// 清空对话历史（保留系统提示词）
    pub fn reset(&mut self) {
        self.history.reset();
    }

    /// 提交新输入并开始生成
    ///
    /// 参数或输入无效时直接返回错误，历史不变。返回的流逐步产出更长的回复，
    /// 正常结束且有内容时追加为助手消息；出错或被提前丢弃时不写入历史。
    pub fn submit<'a>(
        &'a mut self,
        input: UserInput,
        params: &GenerationParams,
    ) -> Result<impl Stream<Item = Result<String>> + 'a> {
        params.validate()?;
        let payload = self
            .formatter
            .format(&mut self.history, input, &self.saved_images)?;
        debug!("Formatted request payload with {} messages", payload.len());

        let responses = self.accumulator.stream(payload, params);
        let history = &mut self.history;

        Ok(async_stream::stream! {
            futures::pin_mut!(responses);
            let mut last = None;

            while let Some(item) = responses.next().await {
                match item {
                    Ok(text) => {
                        last = Some(text.clone());
                        yield Ok(text);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            if let Some(text) = last {
                let turn = Turn::assistant(text);
                debug!(
                    "Committed assistant turn created at {} ({} turns)",
                    turn.created_at().to_rfc3339(),
                    history.len() + 1
                );
                history.push(turn);
            }
        })
    }

    /// 手动提交助手回复，供直接驱动 [`StreamAccumulator`] 的调用方使用
    pub fn commit_response(&mut self, text: impl Into<String>) {
        let turn = Turn::assistant(text);
        debug!("Committed assistant turn created at {}", turn.created_at().to_rfc3339());
        self.history.push(turn);
    }

    pub fn saved_images_mode(&self) -> SavedImagesMode {
        self.formatter.mode()
    }
}
