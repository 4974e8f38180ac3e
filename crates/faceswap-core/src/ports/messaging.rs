//! 메시징 서비스 포트.
//!
//! 구현: `faceswap-network` crate (reqwest, tokio-tungstenite)

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::models::event::InboundEvent;
use crate::models::file::{Channel, FileInfo, FileUpload};
use crate::models::session::RealtimeHandshake;

/// Web API 클라이언트
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// 실시간 세션 시작: 웹소켓 URL과 봇 자신의 ID 획득
    async fn connect_realtime(&self) -> Result<RealtimeHandshake, CoreError>;

    /// 채널 목록 조회
    async fn list_channels(&self) -> Result<Vec<Channel>, CoreError>;

    /// 파일 메타데이터 조회
    ///
    /// 실패 시 `CoreError::Metadata`.
    async fn file_info(&self, file_id: &str) -> Result<FileInfo, CoreError>;

    /// 비공개 URL에서 원본 바이트 다운로드 (Bearer 인증)
    ///
    /// 실패 시 `CoreError::Download`.
    async fn download(&self, url: &str) -> Result<Vec<u8>, CoreError>;

    /// 채널 목록에 파일 업로드
    ///
    /// 실패 시 `CoreError::Upload`. 재시도하지 않는다.
    async fn upload(&self, upload: &FileUpload) -> Result<(), CoreError>;
}

/// 연결된 실시간 링크
///
/// `events`는 ready 신호 이후의 이벤트만 전달하며,
/// 소켓이 끝나면 `InboundEvent::Closed`를 보내고 닫힌다.
#[derive(Debug)]
pub struct RealtimeLink {
    /// 봇 자신의 사용자 ID
    pub self_id: String,
    /// 수신 이벤트 스트림
    pub events: mpsc::Receiver<InboundEvent>,
}

/// 실시간 세션 커넥터
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// 연결 수립 후 ready 신호까지 대기
    ///
    /// ready 전에 소켓이 끝나거나 제한 시간이 지나면 에러.
    async fn connect(&self) -> Result<RealtimeLink, CoreError>;
}
