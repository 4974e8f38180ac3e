//! 얼굴 검출 결과 모델.

use serde::{Deserialize, Serialize};

/// 검출된 얼굴 바운딩 박스 (원본 이미지 픽셀 좌표)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 이미지 경계 안으로 잘라낸 박스
    ///
    /// 경계 밖에 있거나 잘린 결과의 면적이 0이면 `None`.
    pub fn clipped(&self, image_width: u32, image_height: u32) -> Option<FaceBox> {
        if self.x >= image_width || self.y >= image_height {
            return None;
        }
        let width = self.width.min(image_width - self.x);
        let height = self.height.min(image_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(FaceBox::new(self.x, self.y, width, height))
    }
}
