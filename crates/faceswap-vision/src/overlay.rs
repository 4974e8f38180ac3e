//! 오버레이 라이브러리.
//!
//! `face_1.png`, `face_2.png`, … 순번 이미지를 빈 번호가 나올 때까지 로드하고
//! 각 이미지의 좌우 반전본을 함께 보관한다. 로드 이후 불변.

use faceswap_core::error::CoreError;
use image::RgbaImage;
use rand::Rng;
use std::path::Path;
use tracing::{debug, info, warn};

/// 오버레이 파일 이름 접두사
const OVERLAY_PREFIX: &str = "face_";

/// 오버레이 파일 확장자
const OVERLAY_EXTENSION: &str = "png";

/// 오버레이 이미지 1장
#[derive(Debug, Clone)]
pub struct OverlayImage {
    /// 디코드된 비트맵
    pub image: RgbaImage,
    /// 좌우 반전본 여부
    pub mirrored: bool,
}

impl OverlayImage {
    /// 가로/세로 비율
    pub fn aspect_ratio(&self) -> f64 {
        if self.image.height() == 0 {
            return 0.0;
        }
        self.image.width() as f64 / self.image.height() as f64
    }
}

/// 오버레이 후보 모음 (원본 + 반전본)
#[derive(Debug, Clone, Default)]
pub struct OverlayLibrary {
    images: Vec<OverlayImage>,
}

impl OverlayLibrary {
    /// 디렉토리에서 순번 오버레이 로드
    ///
    /// 존재하는 파일의 I/O/디코드 실패만 `CoreError::Load`.
    /// 파일이 하나도 없으면 빈 라이브러리를 반환한다 (호출자가 확인).
    pub fn load(dir: &Path) -> Result<Self, CoreError> {
        let mut originals = Vec::new();
        let mut index = 1u32;

        loop {
            let path = dir.join(format!("{OVERLAY_PREFIX}{index}.{OVERLAY_EXTENSION}"));
            if !path.exists() {
                break;
            }

            let image = image::open(&path)
                .map_err(|e| {
                    CoreError::Load(format!("오버레이 로드 실패: {}: {e}", path.display()))
                })?
                .to_rgba8();
            debug!(
                "오버레이 로드: {} ({}x{})",
                path.display(),
                image.width(),
                image.height()
            );
            originals.push(image);
            index += 1;
        }

        let library = Self::from_originals(originals);
        if library.is_empty() {
            warn!("오버레이 이미지 없음: {}", dir.display());
        } else {
            info!(
                "오버레이 {}장 로드 (반전본 포함 {}개)",
                library.len() / 2,
                library.len()
            );
        }
        Ok(library)
    }

    /// 원본 비트맵 목록으로 생성 (반전본 자동 추가)
    pub fn from_originals(originals: Vec<RgbaImage>) -> Self {
        let mut images = Vec::with_capacity(originals.len() * 2);
        for image in originals {
            let flipped = image::imageops::flip_horizontal(&image);
            images.push(OverlayImage {
                image,
                mirrored: false,
            });
            images.push(OverlayImage {
                image: flipped,
                mirrored: true,
            });
        }
        Self { images }
    }

    /// 전체 후보 수 (원본 + 반전본)
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// 균등 확률로 후보 1개 선택 (비어 있으면 `None`)
    pub fn pick_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&OverlayImage> {
        if self.images.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.images.len());
        self.images.get(index)
    }
}
