//! 검출 전처리.
//!
//! 컬러 비트맵 → 그레이스케일 → 히스토그램 평활화.
//! 조명 차이에 따른 검출 편차를 줄인다.

use image::{GrayImage, RgbaImage};
use tracing::debug;

/// 검출용 정규화 이미지 생성
pub fn normalize_for_detection(image: &RgbaImage) -> GrayImage {
    let mut gray = image::imageops::grayscale(image);
    equalize_histogram(&mut gray);
    gray
}

/// 히스토그램 평활화 (제자리)
///
/// 누적 분포를 0..=255로 재매핑한다. 단색 이미지는 변경하지 않는다.
pub fn equalize_histogram(image: &mut GrayImage) {
    let total = image.width() as u64 * image.height() as u64;
    if total == 0 {
        return;
    }

    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let mut cdf = [0u64; 256];
    let mut running = 0u64;
    for (i, count) in histogram.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }

    // 첫 번째 0이 아닌 누적값
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total == cdf_min {
        debug!("단색 이미지: 평활화 생략");
        return;
    }

    let scale = 255.0 / (total - cdf_min) as f64;
    let mut lut = [0u8; 256];
    for (i, value) in lut.iter_mut().enumerate() {
        let mapped = (cdf[i].saturating_sub(cdf_min)) as f64 * scale;
        *value = mapped.round().clamp(0.0, 255.0) as u8;
    }

    for pixel in image.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    #[test]
    fn equalization_stretches_range() {
        // 100..=103 좁은 범위 → 0..=255로 확장
        let mut gray = GrayImage::from_fn(4, 1, |x, _| Luma([100 + x as u8]));
        equalize_histogram(&mut gray);
        assert_eq!(gray.get_pixel(0, 0)[0], 0);
        assert_eq!(gray.get_pixel(3, 0)[0], 255);
        assert!(gray.get_pixel(1, 0)[0] < gray.get_pixel(2, 0)[0]);
    }

    #[test]
    fn flat_image_unchanged() {
        let mut gray = GrayImage::from_pixel(5, 5, Luma([77]));
        equalize_histogram(&mut gray);
        assert!(gray.pixels().all(|p| p[0] == 77));
    }

    #[test]
    fn normalize_keeps_dimensions() {
        let rgba = RgbaImage::from_fn(7, 3, |x, y| Rgba([x as u8 * 30, y as u8 * 60, 10, 255]));
        let gray = normalize_for_detection(&rgba);
        assert_eq!(gray.dimensions(), (7, 3));
    }

    #[test]
    fn empty_image_is_noop() {
        let mut gray = GrayImage::new(0, 0);
        equalize_histogram(&mut gray);
        assert_eq!(gray.dimensions(), (0, 0));
    }
}
