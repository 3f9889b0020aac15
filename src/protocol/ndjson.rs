use crate::error::Result;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

/// 将字节流按行切分并解析为 JSON
///
/// Ollama 的流式响应是 NDJSON：每行一个完整 JSON 对象，但网络分块不保证按行对齐，
/// 所以需要在缓冲区中累积直到遇到换行。无法解析的行会被跳过。
pub fn decode<S>(stream: S) -> impl Stream<Item = Result<Value>> + Send + 'static
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    async_stream::stream! {
        let mut buffer = BytesMut::new();
        futures::pin_mut!(stream);

        while let Some(chunk_result) = stream.next().await {
            match chunk_result {
                Ok(chunk) => {
                    buffer.extend_from_slice(&chunk);

                    // 按行处理缓冲区
                    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line = buffer.split_to(pos + 1);
                        if let Some(value) = parse_line(&line) {
                            yield Ok(value);
                        }
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        // 最后一行可能没有换行符
        if let Some(value) = parse_line(&buffer) {
            yield Ok(value);
        }
    }
}

fn parse_line(line: &[u8]) -> Option<Value> {
    let line_str = String::from_utf8_lossy(line);
    let line_str = line_str.trim();
    if line_str.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(line_str) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Skipping undecodable stream line ({} bytes): {}", line_str.len(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures::stream;
    use serde_json::json;

    async fn collect(chunks: Vec<Result<Bytes>>) -> Vec<Result<Value>> {
        decode(stream::iter(chunks)).collect().await
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_chunks() {
        let values = collect(vec![
            Ok(Bytes::from_static(b"{\"message\":{\"content\":\"He")),
            Ok(Bytes::from_static(b"l\"}}\n{\"done\"")),
            Ok(Bytes::from_static(b":true}\n")),
        ])
        .await;

        let values: Vec<Value> = values.into_iter().map(|v| v.unwrap()).collect();
        assert_eq!(
            values,
            vec![json!({"message": {"content": "Hel"}}), json!({"done": true})]
        );
    }

    #[tokio::test]
    async fn flushes_trailing_line_and_skips_garbage() {
        let values = collect(vec![
            Ok(Bytes::from_static(b"not json\n\n")),
            Ok(Bytes::from_static(b"{\"a\":1}")),
        ])
        .await;

        assert_eq!(values.len(), 1);
        assert_eq!(values[0].as_ref().unwrap(), &json!({"a": 1}));
    }

    #[tokio::test]
    async fn stops_after_transport_error() {
        let values = collect(vec![
            Ok(Bytes::from_static(b"{\"a\":1}\n")),
            Err(Error::Generation("connection reset".into())),
            Ok(Bytes::from_static(b"{\"a\":2}\n")),
        ])
        .await;

        assert_eq!(values.len(), 2);
        assert!(values[0].is_ok());
        assert!(matches!(values[1], Err(Error::Generation(_))));
    }
}
