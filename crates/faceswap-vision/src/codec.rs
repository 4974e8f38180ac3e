//! PNG 코덱.
//!
//! `ImageCodec` 포트 구현. 입력은 `image`가 지원하는 모든 포맷,
//! 출력은 항상 PNG (무손실).

use faceswap_core::error::CoreError;
use faceswap_core::ports::vision::ImageCodec;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// PNG 코덱: `ImageCodec` 포트 구현
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

impl ImageCodec for PngCodec {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::Decode("빈 입력".to_string()));
        }
        let image = image::load_from_memory(bytes)
            .map_err(|e| CoreError::Decode(format!("이미지 디코드 실패: {e}")))?
            .to_rgba8();
        debug!(
            "디코드: {} bytes → {}x{}",
            bytes.len(),
            image.width(),
            image.height()
        );
        Ok(image)
    }

    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, CoreError> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| CoreError::Encode(format!("PNG 인코딩 실패: {e}")))?;
        let bytes = buffer.into_inner();
        debug!(
            "PNG 인코딩: {}x{} → {} bytes",
            image.width(),
            image.height(),
            bytes.len()
        );
        Ok(bytes)
    }
}
