//! Faceswap 도메인 모델.
//!
//! 수신 이벤트, 파일 메타데이터, 얼굴 박스, 세션 상태를 정의한다.

pub mod event;
pub mod face;
pub mod file;
pub mod session;
