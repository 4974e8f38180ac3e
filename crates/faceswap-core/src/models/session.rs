//! 세션 모델.
//!
//! 실시간 연결 상태와 핸드셰이크 결과를 표현.

use serde::{Deserialize, Serialize};

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// 연결 끊김 (다음 점검 주기에 재연결)
    Disconnected,
    /// 연결 중 (ready 신호 대기)
    Connecting,
    /// 연결됨
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
        }
    }
}

/// 실시간 세션 시작 응답 (`rtm.connect`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeHandshake {
    /// 웹소켓 URL
    pub url: String,
    /// 봇 자신의 사용자 ID
    pub self_id: String,
    /// 봇 자신의 이름
    pub self_name: String,
}
