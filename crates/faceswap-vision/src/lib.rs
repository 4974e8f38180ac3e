//! # faceswap-vision
//!
//! 이미지 처리 크레이트.
//! 디코드/PNG 인코딩, 검출 전처리(그레이스케일 + 평활화),
//! OpenCV Haar 캐스케이드 로드와 얼굴 검출, 오버레이 라이브러리와 합성을 담당한다.

pub mod cascade;
pub mod codec;
pub mod compositor;
pub mod detector;
pub mod normalize;
pub mod overlay;
