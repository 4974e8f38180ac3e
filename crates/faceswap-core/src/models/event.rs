//! 실시간 수신 이벤트 모델.
//!
//! 웹소켓 텍스트 프레임을 디코드한 결과.

use serde::{Deserialize, Serialize};

/// "파일 공유됨" 알림: 수신 알림 1건당 하나, 저장하지 않음
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSharedEvent {
    /// 공유된 파일 ID
    pub file_id: String,
    /// 업로드한 사용자 ID
    pub user_id: String,
}

impl FileSharedEvent {
    pub fn new(file_id: &str, user_id: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// 디코드된 수신 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// 서버 ready 신호 (`hello`)
    Ready,
    /// 파일 공유 알림 (`file_shared`)
    FileShared(FileSharedEvent),
    /// 서버가 곧 연결을 끊겠다고 통보 (`goodbye`)
    Goodbye,
    /// 처리하지 않는 이벤트 타입
    Other(String),
    /// 소켓 종료 또는 수신 에러
    Closed,
}

impl InboundEvent {
    /// 연결 종료를 의미하는 이벤트인지
    pub fn is_terminal(&self) -> bool {
        matches!(self, InboundEvent::Goodbye | InboundEvent::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_shared_serde() {
        let json = r#"{"file_id":"F123","user_id":"U456"}"#;
        let event: FileSharedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, FileSharedEvent::new("F123", "U456"));
    }

    #[test]
    fn terminal_events() {
        assert!(InboundEvent::Closed.is_terminal());
        assert!(InboundEvent::Goodbye.is_terminal());
        assert!(!InboundEvent::Ready.is_terminal());
        assert!(!InboundEvent::Other("presence_change".into()).is_terminal());
    }
}
