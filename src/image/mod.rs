use crate::error::{Error, Result};
use crate::models::{EncodedImage, ImageAttachment, ImageSource};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::{debug, warn};

/// 将字节编码为 base64，纯函数
pub fn encode_bytes(bytes: &[u8]) -> EncodedImage {
    EncodedImage::new(STANDARD.encode(bytes))
}

/// 读取文件并编码
pub fn encode_path(path: &Path) -> Result<EncodedImage> {
    if !path.exists() {
        return Err(Error::Encoding {
            path: path.to_path_buf(),
            reason: "image file not found".to_string(),
        });
    }

    let bytes = std::fs::read(path).map_err(|e| Error::Encoding {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!("Encoded image {} ({} bytes)", path.display(), bytes.len());
    Ok(encode_bytes(&bytes))
}

pub fn encode(source: &ImageSource) -> Result<EncodedImage> {
    match source {
        ImageSource::Path(path) => encode_path(path),
        ImageSource::Bytes(bytes) => Ok(encode_bytes(bytes)),
    }
}

/// 编码失败时记录日志并返回 None，调用方继续处理其余图片
pub fn try_attach(source: ImageSource) -> Option<ImageAttachment> {
    match encode(&source) {
        Ok(encoded) => Some(ImageAttachment { source, encoded }),
        Err(e) => {
            warn!("Skipping image {}: {}", source, e);
            None
        }
    }
}

/// 解码，主要用于校验
pub fn decode(image: &EncodedImage) -> Result<Vec<u8>> {
    STANDARD.decode(image.as_str()).map_err(|e| Error::Encoding {
        path: "<base64>".into(),
        reason: e.to_string(),
    })
}
