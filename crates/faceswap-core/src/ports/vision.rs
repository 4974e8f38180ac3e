//! 비전(이미지 처리) 포트.
//!
//! 구현: `faceswap-vision` crate (image)

use image::{GrayImage, RgbaImage};

use crate::error::CoreError;
use crate::models::face::FaceBox;

/// 얼굴 검출기
///
/// 입력은 그레이스케일 + 히스토그램 평활화된 이미지.
/// 결과 순서는 검출기 출력 순서 그대로 합성에 사용된다.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, gray: &GrayImage) -> Vec<FaceBox>;
}

/// 이미지 코덱
pub trait ImageCodec: Send + Sync {
    /// 임의 포맷 바이트 → RGBA 비트맵
    ///
    /// 손상된 입력은 `CoreError::Decode`.
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, CoreError>;

    /// RGBA 비트맵 → 무손실 포맷 바이트
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, CoreError>;
}
