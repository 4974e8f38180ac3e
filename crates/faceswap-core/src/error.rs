//! Faceswap 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 이 타입을 그대로 반환한다.
//! 시작 단계 에러(설정/로드/연결)는 프로세스 종료 코드로 매핑되고,
//! 이벤트 단위 에러(메타데이터/다운로드/디코드/업로드)는 로그 후 폐기된다.

use thiserror::Error;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 파일 누락/형식 오류: 시작 불가
    #[error("설정 에러: {0}")]
    Config(String),

    /// 분류기/오버레이 에셋 로드 실패: 시작 불가
    #[error("에셋 로드 에러: {0}")]
    Load(String),

    /// 실시간 세션 연결 실패
    #[error("연결 에러: {0}")]
    Connect(String),

    /// 파일 메타데이터 조회 실패
    #[error("메타데이터 조회 실패: {0}")]
    Metadata(String),

    /// 원본 파일 다운로드 실패
    #[error("다운로드 실패: {0}")]
    Download(String),

    /// 원본 이미지 디코드 실패
    #[error("이미지 디코드 실패: {0}")]
    Decode(String),

    /// 결과 이미지 PNG 인코딩 실패
    #[error("이미지 인코딩 실패: {0}")]
    Encode(String),

    /// 결과 업로드 실패
    #[error("업로드 실패: {0}")]
    Upload(String),

    /// 인증 실패 (토큰 무효 등)
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 네트워크 에러 (연결 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// Web API가 `ok: false`로 응답
    #[error("API 에러: {method}: {error}")]
    Api {
        /// 호출한 API 메서드 (예: "files.info")
        method: String,
        /// 서버가 보고한 에러 코드
        error: String,
    },

    /// 실행 타임아웃
    #[error("실행 타임아웃: {timeout_ms}ms 초과")]
    Timeout {
        /// 초과된 타임아웃 시간 (밀리초)
        timeout_ms: u64,
    },

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}

impl CoreError {
    /// 프로세스 종료 코드
    ///
    /// 0은 정상 종료 전용이므로 여기서는 반환하지 않는다.
    pub fn exit_code(&self) -> u8 {
        match self {
            CoreError::Config(_) => 2,
            CoreError::Load(_) => 3,
            CoreError::Connect(_) | CoreError::Timeout { .. } => 4,
            _ => 1,
        }
    }
}
