//! Haar 캐스케이드 얼굴 검출기.
//!
//! `FaceDetector` 포트 구현. OpenCV 캐스케이드 XML을 로드해
//! 적분 이미지 위에서 스케일 피라미드 슬라이딩 윈도우로 평가하고,
//! 겹치는 후보를 묶어 최종 박스를 만든다.

use faceswap_core::error::CoreError;
use faceswap_core::models::face::FaceBox;
use faceswap_core::ports::vision::FaceDetector;
use image::GrayImage;
use std::path::Path;
use tracing::{debug, info};

use crate::cascade::{FeatureRect, HaarCascade};

/// 검출 파라미터
#[derive(Debug, Clone, Copy)]
pub struct DetectionParams {
    /// 스케일 피라미드 배율
    pub scale_factor: f64,
    /// 최종 박스로 인정할 최소 후보 수
    pub min_neighbors: usize,
    /// 후보 묶음 허용 오차 비율
    pub group_eps: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            group_eps: 0.2,
        }
    }
}

/// 적분 이미지 (합 + 제곱합)
pub struct IntegralImage {
    width: u32,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    pub fn new(image: &GrayImage) -> Self {
        let (w, h) = image.dimensions();
        let stride = w as usize + 1;
        let mut sum = vec![0u64; stride * (h as usize + 1)];
        let mut sq_sum = vec![0u64; stride * (h as usize + 1)];

        for y in 0..h as usize {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w as usize {
                let v = image.get_pixel(x as u32, y as u32)[0] as u64;
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        Self {
            width: w,
            sum,
            sq_sum,
        }
    }

    #[inline]
    fn lookup(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }

    /// 사각형 픽셀 합
    pub fn rect_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::lookup(&self.sum, self.width as usize + 1, x, y, w, h)
    }

    /// 사각형 픽셀 제곱합
    pub fn rect_sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::lookup(&self.sq_sum, self.width as usize + 1, x, y, w, h)
    }
}

/// 스케일이 적용된 특징 사각형 (윈도우 원점 기준)
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScaledRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

impl ScaledRect {
    fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

struct ScaledClassifier {
    rects: Vec<ScaledRect>,
    threshold: f64,
    left: f64,
    right: f64,
}

struct ScaledStage {
    threshold: f64,
    classifiers: Vec<ScaledClassifier>,
}

/// 특징 사각형 스케일링
///
/// 양 끝 좌표를 각각 반올림해 인접한 사각형이 틈 없이 맞물리게 하고,
/// 첫 사각형 가중치를 다시 계산해 가중 면적 합을 반올림 전과 같게 맞춘다.
fn scale_feature(features: &[FeatureRect], scale: f64) -> Vec<ScaledRect> {
    let scaled = |v: u32| (v as f64 * scale).round() as u32;
    let mut rects: Vec<ScaledRect> = features
        .iter()
        .map(|f| {
            let (x, y) = (scaled(f.x), scaled(f.y));
            ScaledRect {
                x,
                y,
                width: scaled(f.x + f.width).saturating_sub(x).max(1),
                height: scaled(f.y + f.height).saturating_sub(y).max(1),
                weight: f.weight,
            }
        })
        .collect();

    if let Some((first, rest)) = rects.split_first_mut() {
        if !rest.is_empty() {
            let rest_sum: f64 = rest.iter().map(|r| r.weight * r.area()).sum();
            first.weight = -rest_sum / first.area();
        }
    }
    rects
}

/// 캐스케이드 검출기: `FaceDetector` 포트 구현
#[derive(Debug)]
pub struct CascadeDetector {
    cascade: HaarCascade,
    params: DetectionParams,
}

impl CascadeDetector {
    /// OpenCV 캐스케이드 XML 에셋 로드
    ///
    /// 파일 누락/형식 오류는 `CoreError::Load`.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Load(format!("분류기 파일 읽기 실패: {}: {e}", path.display()))
        })?;
        let cascade = HaarCascade::from_opencv_xml(&content).map_err(|e| match e {
            CoreError::Load(msg) => CoreError::Load(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        let detector = Self::new(cascade, DetectionParams::default())?;
        info!(
            "분류기 로드: {} ({}단계, 윈도우 {}x{})",
            path.display(),
            detector.cascade.stages.len(),
            detector.cascade.window_width,
            detector.cascade.window_height
        );
        Ok(detector)
    }

    pub fn new(cascade: HaarCascade, params: DetectionParams) -> Result<Self, CoreError> {
        cascade.validate()?;
        if params.scale_factor <= 1.0 {
            return Err(CoreError::Load(format!(
                "scale_factor는 1보다 커야 합니다: {}",
                params.scale_factor
            )));
        }
        Ok(Self { cascade, params })
    }

    fn scaled_stages(&self, scale: f64) -> Vec<ScaledStage> {
        self.cascade
            .stages
            .iter()
            .map(|stage| ScaledStage {
                threshold: stage.threshold,
                classifiers: stage
                    .classifiers
                    .iter()
                    .map(|c| ScaledClassifier {
                        rects: scale_feature(&c.features, scale),
                        threshold: c.threshold,
                        left: c.left,
                        right: c.right,
                    })
                    .collect(),
            })
            .collect()
    }
}

/// 윈도우 1개 평가: 모든 단계를 통과하면 true
fn evaluate(
    stages: &[ScaledStage],
    integral: &IntegralImage,
    (x, y): (u32, u32),
    (win_w, win_h): (u32, u32),
) -> bool {
    let area = win_w as f64 * win_h as f64;
    let sum = integral.rect_sum(x, y, win_w, win_h) as f64;
    let sq = integral.rect_sq_sum(x, y, win_w, win_h) as f64;
    let mean = sum / area;
    let variance = sq / area - mean * mean;
    let std_dev = if variance > 1.0 { variance.sqrt() } else { 1.0 };

    for stage in stages {
        let mut stage_sum = 0.0;
        for classifier in &stage.classifiers {
            let value = classifier
                .rects
                .iter()
                .map(|r| r.weight * integral.rect_sum(x + r.x, y + r.y, r.width, r.height) as f64)
                .sum::<f64>()
                / area;
            stage_sum += if value < classifier.threshold * std_dev {
                classifier.left
            } else {
                classifier.right
            };
        }
        if stage_sum < stage.threshold {
            return false;
        }
    }
    true
}

impl FaceDetector for CascadeDetector {
    fn detect(&self, gray: &GrayImage) -> Vec<FaceBox> {
        let (iw, ih) = gray.dimensions();
        let (ww, wh) = (self.cascade.window_width, self.cascade.window_height);
        if iw < ww || ih < wh {
            return Vec::new();
        }

        let integral = IntegralImage::new(gray);
        let mut candidates = Vec::new();
        let mut scale = 1.0f64;

        loop {
            let win_w = (ww as f64 * scale).round() as u32;
            let win_h = (wh as f64 * scale).round() as u32;
            if win_w > iw || win_h > ih {
                break;
            }

            let stages = self.scaled_stages(scale);
            let step = ((scale * 2.0).round() as usize).max(1);
            for y in (0..=ih - win_h).step_by(step) {
                for x in (0..=iw - win_w).step_by(step) {
                    if evaluate(&stages, &integral, (x, y), (win_w, win_h)) {
                        candidates.push(FaceBox::new(x, y, win_w, win_h));
                    }
                }
            }
            scale *= self.params.scale_factor;
        }

        let faces =
            group_rectangles(&candidates, self.params.min_neighbors, self.params.group_eps);
        debug!(
            "얼굴 검출: {}x{} → 후보 {}개, 최종 {}개",
            iw,
            ih,
            candidates.len(),
            faces.len()
        );
        faces
    }
}

/// 비슷한 위치/크기 후보 판정
fn is_similar(a: &FaceBox, b: &FaceBox, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    let diff = |p: u32, q: u32| (p as f64 - q as f64).abs();
    diff(a.x, b.x) <= delta
        && diff(a.y, b.y) <= delta
        && diff(a.x + a.width, b.x + b.width) <= delta
        && diff(a.y + a.height, b.y + b.height) <= delta
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// 후보 묶음: 묶음 크기가 `min_neighbors` 이상인 것만 평균 박스로 반환
///
/// `min_neighbors == 0`이면 후보를 그대로 반환한다.
/// 결과 순서는 각 묶음의 첫 후보 순서.
pub fn group_rectangles(
    candidates: &[FaceBox],
    min_neighbors: usize,
    eps: f64,
) -> Vec<FaceBox> {
    if min_neighbors == 0 {
        return candidates.to_vec();
    }

    let n = candidates.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if is_similar(&candidates[i], &candidates[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj.max(ri)] = ri.min(rj);
                }
            }
        }
    }

    // (루트, 개수, x합, y합, w합, h합)
    let mut clusters: Vec<(usize, u64, u64, u64, u64, u64)> = Vec::new();
    for (i, c) in candidates.iter().enumerate() {
        let root = find(&mut parent, i);
        match clusters.iter_mut().find(|entry| entry.0 == root) {
            Some(entry) => {
                entry.1 += 1;
                entry.2 += c.x as u64;
                entry.3 += c.y as u64;
                entry.4 += c.width as u64;
                entry.5 += c.height as u64;
            }
            None => clusters.push((
                root,
                1,
                c.x as u64,
                c.y as u64,
                c.width as u64,
                c.height as u64,
            )),
        }
    }

    clusters
        .into_iter()
        .filter(|c| c.1 as usize >= min_neighbors)
        .map(|(_, count, x, y, w, h)| {
            let avg = |v: u64| ((v as f64) / count as f64).round() as u32;
            FaceBox::new(avg(x), avg(y), avg(w), avg(h))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::tests::EDGE_CASCADE_XML;
    use crate::cascade::{Stage, WeakClassifier};
    use image::Luma;
    use tempfile::TempDir;

    fn rect(x: u32, y: u32, width: u32, height: u32, weight: f64) -> FeatureRect {
        FeatureRect {
            x,
            y,
            width,
            height,
            weight,
        }
    }

    fn single_stage(window: u32, features: Vec<FeatureRect>, threshold: f64) -> HaarCascade {
        HaarCascade {
            window_width: window,
            window_height: window,
            stages: vec![Stage {
                threshold: 0.5,
                classifiers: vec![WeakClassifier {
                    features,
                    threshold,
                    left: -1.0,
                    right: 1.0,
                }],
            }],
        }
    }

    /// 왼쪽 절반이 오른쪽보다 밝은 윈도우를 통과시키는 캐스케이드
    fn edge_cascade() -> HaarCascade {
        single_stage(4, vec![rect(0, 0, 2, 4, 1.0), rect(2, 0, 2, 4, -1.0)], 0.1)
    }

    /// 24x24 3분할 특징 (가운데 띠 가중치 3)
    fn band_cascade() -> HaarCascade {
        single_stage(
            24,
            vec![rect(6, 4, 12, 9, -1.0), rect(6, 7, 12, 3, 3.0)],
            0.05,
        )
    }

    fn params(min_neighbors: usize) -> DetectionParams {
        DetectionParams {
            min_neighbors,
            ..DetectionParams::default()
        }
    }

    #[test]
    fn integral_sums() {
        let img = GrayImage::from_fn(3, 2, |x, y| Luma([(x + y * 3) as u8]));
        // 0 1 2 / 3 4 5
        let integral = IntegralImage::new(&img);
        assert_eq!(integral.rect_sum(0, 0, 3, 2), 15);
        assert_eq!(integral.rect_sum(1, 1, 2, 1), 9);
        assert_eq!(integral.rect_sq_sum(0, 0, 2, 1), 1);
    }

    #[test]
    fn detects_bright_left_edge() {
        // 왼쪽 4열 흰색, 오른쪽 4열 검정
        let img = GrayImage::from_fn(8, 4, |x, _| if x < 4 { Luma([255]) } else { Luma([0]) });
        let detector = CascadeDetector::new(edge_cascade(), params(1)).unwrap();

        let faces = detector.detect(&img);
        assert_eq!(faces, vec![FaceBox::new(2, 0, 4, 4)]);
    }

    #[test]
    fn uniform_image_has_no_faces() {
        let img = GrayImage::from_pixel(16, 16, Luma([128]));
        let detector = CascadeDetector::new(edge_cascade(), params(1)).unwrap();
        assert!(detector.detect(&img).is_empty());
    }

    #[test]
    fn flat_images_pass_no_window_at_any_scale() {
        // min_neighbors 0: 묶음 없이 모든 후보가 그대로 나옴
        for cascade in [edge_cascade(), band_cascade()] {
            let detector = CascadeDetector::new(cascade, params(0)).unwrap();
            for size in [16, 23, 37, 64] {
                for value in [0u8, 77, 128, 255] {
                    let img = GrayImage::from_pixel(size, size, Luma([value]));
                    let faces = detector.detect(&img);
                    assert!(faces.is_empty(), "{size}px, 값 {value}: {faces:?}");
                }
            }
        }
    }

    #[test]
    fn scaled_rects_tile_the_window() {
        let features = [rect(0, 0, 2, 4, 1.0), rect(2, 0, 2, 4, -1.0)];
        let mut scale = 1.0f64;
        while scale < 12.0 {
            let win_w = (4.0 * scale).round() as u32;
            let rects = scale_feature(&features, scale);

            assert_eq!(rects[0].x, 0);
            assert_eq!(rects[0].x + rects[0].width, rects[1].x, "scale {scale}");
            assert_eq!(rects[1].x + rects[1].width, win_w, "scale {scale}");

            let weighted: f64 = rects.iter().map(|r| r.weight * r.area()).sum();
            assert!(weighted.abs() < 1e-9, "scale {scale}: {weighted}");
            scale *= 1.1;
        }
    }

    #[test]
    fn unscaled_balanced_feature_keeps_weights() {
        let rects = scale_feature(&[rect(6, 4, 12, 9, -1.0), rect(6, 7, 12, 3, 3.0)], 1.0);
        assert!((rects[0].weight + 1.0).abs() < 1e-12);
        assert_eq!(rects[1].weight, 3.0);
    }

    #[test]
    fn image_smaller_than_window() {
        let img = GrayImage::from_pixel(3, 3, Luma([255]));
        let detector = CascadeDetector::new(edge_cascade(), params(1)).unwrap();
        assert!(detector.detect(&img).is_empty());
    }

    #[test]
    fn grouping_merges_neighbors_and_drops_singletons() {
        let candidates = vec![
            FaceBox::new(10, 10, 20, 20),
            FaceBox::new(11, 10, 20, 20),
            FaceBox::new(10, 11, 21, 20),
            FaceBox::new(80, 80, 20, 20),
        ];
        let grouped = group_rectangles(&candidates, 3, 0.2);
        assert_eq!(grouped.len(), 1);
        let g = grouped[0];
        assert!(g.x >= 10 && g.x <= 11);
        assert_eq!(g.height, 20);

        assert_eq!(group_rectangles(&candidates, 0, 0.2).len(), 4);
        assert_eq!(group_rectangles(&candidates, 1, 0.2).len(), 2);
    }

    #[test]
    fn invalid_cascade_rejected() {
        let mut cascade = edge_cascade();
        cascade.stages[0].classifiers[0].features[1].x = 3;
        assert!(matches!(
            CascadeDetector::new(cascade, DetectionParams::default()),
            Err(CoreError::Load(_))
        ));

        let bad_scale = DetectionParams {
            scale_factor: 1.0,
            ..DetectionParams::default()
        };
        assert!(CascadeDetector::new(edge_cascade(), bad_scale).is_err());
    }

    #[test]
    fn load_from_opencv_xml_asset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("haarcascade_edge.xml");
        std::fs::write(&path, EDGE_CASCADE_XML).unwrap();

        let detector = CascadeDetector::load(&path).unwrap();
        assert_eq!(detector.cascade, edge_cascade());

        assert!(matches!(
            CascadeDetector::load(&dir.path().join("missing.xml")),
            Err(CoreError::Load(_))
        ));

        std::fs::write(&path, "<opencv_storage><cascade>").unwrap();
        let err = CascadeDetector::load(&path).unwrap_err();
        assert!(matches!(err, CoreError::Load(_)));
        assert!(err.to_string().contains("haarcascade_edge.xml"));
    }
}
