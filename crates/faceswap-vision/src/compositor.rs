//! 오버레이 합성기.
//!
//! 검출된 얼굴 박스마다 오버레이 1장을 무작위로 골라 덮어 그린다.
//! 배치 규칙:
//! - 높이를 박스 높이에 맞추고 너비는 오버레이 고유 비율로 결정
//! - 박스의 가로 중심에 정렬
//! - `(1 + upscale)`배 확대, 늘어난 만큼 원점을 바깥으로 절반씩 이동

use faceswap_core::models::face::FaceBox;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::overlay::{OverlayImage, OverlayLibrary};

/// 오버레이를 그릴 사각형 (캔버스 밖 좌표 허용)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Placement {
    /// 박스와 오버레이 비율로 배치 계산
    ///
    /// 비율 기반 너비는 정수로 내림한 뒤 사용한다.
    pub fn compute(face: &FaceBox, aspect_ratio: f64, upscale: f64) -> Self {
        let h = face.height as f64;
        let w = (h * aspect_ratio).floor();
        let difference = (face.width as f64 - w) / 2.0;

        Self {
            x: face.x as f64 + difference - (w * upscale / 2.0),
            y: face.y as f64 - (h * upscale / 2.0),
            width: w * (1.0 + upscale),
            height: h * (1.0 + upscale),
        }
    }

    /// 픽셀 단위 (x, y, width, height)
    ///
    /// 크기가 0이면 `None`.
    pub fn to_pixels(&self) -> Option<(i64, i64, u32, u32)> {
        let width = self.width.round();
        let height = self.height.round();
        if width < 1.0 || height < 1.0 {
            return None;
        }
        Some((
            self.x.round() as i64,
            self.y.round() as i64,
            width as u32,
            height as u32,
        ))
    }
}

/// 오버레이 합성기
///
/// 난수원을 주입받아 테스트에서 결정적으로 동작한다.
pub struct Compositor {
    rng: Mutex<StdRng>,
}

impl Compositor {
    /// 시드 고정 난수원으로 생성
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// 엔트로피 기반 난수원으로 생성
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// 박스마다 오버레이를 그린 새 이미지 반환
    ///
    /// 출력 크기는 항상 입력과 같다. 라이브러리가 비어 있으면 원본 복제.
    pub fn composite(
        &self,
        base: &RgbaImage,
        boxes: &[FaceBox],
        library: &OverlayLibrary,
        upscale: f64,
    ) -> RgbaImage {
        let mut canvas = base.clone();
        let (canvas_w, canvas_h) = canvas.dimensions();

        for face in boxes {
            let Some(face) = face.clipped(canvas_w, canvas_h) else {
                debug!("캔버스 밖 박스 무시: {face:?}");
                continue;
            };

            let overlay = {
                let mut rng = self.rng.lock();
                library.pick_random(&mut *rng)
            };
            let Some(overlay) = overlay else {
                break;
            };

            let placement = Placement::compute(&face, overlay.aspect_ratio(), upscale);
            draw_overlay(&mut canvas, overlay, &placement);
        }

        canvas
    }
}

/// 배치 사각형에 맞춰 리사이즈 후 알파 합성
///
/// 캔버스에 보이는 부분만 원본에서 잘라 리사이즈하므로
/// 배치가 아무리 커도 버퍼는 캔버스 크기를 넘지 않는다.
pub fn draw_overlay(canvas: &mut RgbaImage, overlay: &OverlayImage, placement: &Placement) {
    let Some((x, y, width, height)) = placement.to_pixels() else {
        return;
    };
    let (canvas_w, canvas_h) = canvas.dimensions();
    let (src_w, src_h) = overlay.image.dimensions();
    if src_w == 0 || src_h == 0 {
        return;
    }

    let (Some((vx, vw)), Some((vy, vh))) = (
        visible_span(x, width, canvas_w),
        visible_span(y, height, canvas_h),
    ) else {
        debug!("캔버스 밖 오버레이 생략: ({x}, {y}) {width}x{height}");
        return;
    };

    let (sx, sw) = source_span(vx - x, vw, width, src_w);
    let (sy, sh) = source_span(vy - y, vh, height, src_h);
    let source = imageops::crop_imm(&overlay.image, sx, sy, sw, sh).to_image();
    let resized = imageops::resize(&source, vw, vh, FilterType::Triangle);
    imageops::overlay(canvas, &resized, vx, vy);

    debug!(
        "오버레이 합성: ({x}, {y}) {width}x{height}, 보이는 영역 {vw}x{vh} (반전={})",
        overlay.mirrored
    );
}

/// 캔버스 안에 들어오는 구간 (시작, 길이)
fn visible_span(start: i64, len: u32, limit: u32) -> Option<(i64, u32)> {
    let lo = start.max(0);
    let hi = (start + i64::from(len)).min(i64::from(limit));
    (hi > lo).then(|| (lo, (hi - lo) as u32))
}

/// 보이는 구간에 대응하는 원본 구간 (바깥쪽으로 반올림)
fn source_span(offset: i64, visible_len: u32, full_len: u32, src_len: u32) -> (u32, u32) {
    let ratio = f64::from(src_len) / f64::from(full_len);
    let lo = (offset as f64 * ratio).floor() as u32;
    let hi = ((offset + i64::from(visible_len)) as f64 * ratio).ceil() as u32;
    let lo = lo.min(src_len - 1);
    let hi = hi.clamp(lo + 1, src_len);
    (lo, hi - lo)
}
