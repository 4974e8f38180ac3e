//! 이벤트 핸들러 포트.
//!
//! 세션 관리자가 `FileSharedEvent`를 넘기는 대상.
//! 구현: `faceswap-app`의 `MediaPipeline`

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::event::FileSharedEvent;

/// 파이프라인 실행 시점의 세션 스냅샷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// 봇 자신의 사용자 ID
    pub self_id: String,
    /// 업로드 대상 채널 ID 목록
    pub channel_ids: Vec<String>,
}

/// 파이프라인 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// 코멘트가 봇/키워드를 언급하지 않음: 아무것도 하지 않음
    NotEligible,
    /// 얼굴 없음: 업로드 생략
    NoFaces,
    /// 업로드 완료
    Uploaded {
        /// 합성한 얼굴 수
        faces: usize,
        /// 업로드한 파일 이름
        filename: String,
    },
}

/// 파일 공유 이벤트 핸들러
#[async_trait]
pub trait FileSharedHandler: Send + Sync {
    async fn handle(
        &self,
        event: &FileSharedEvent,
        session: &SessionContext,
    ) -> Result<PipelineOutcome, CoreError>;
}
