//! 실시간 메시징 WebSocket 클라이언트.
//!
//! `RealtimeConnector` 포트 구현. `rtm.connect`로 받은 URL에 접속해
//! `hello` 신호까지 기다린 뒤, 이후 프레임을 `InboundEvent`로 디코드해 전달한다.
//! keepalive 주기가 설정되면 송신 절반으로 Ping을 보내고, 다음 주기까지
//! 아무 프레임도 오지 않으면 연결이 끊긴 것으로 보고 `Closed`를 보낸다.

use async_trait::async_trait;
use faceswap_core::error::CoreError;
use faceswap_core::models::event::{FileSharedEvent, InboundEvent};
use faceswap_core::ports::messaging::{MessagingApi, RealtimeConnector, RealtimeLink};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 이벤트 채널 버퍼 크기
const EVENT_BUFFER: usize = 64;

// ============================================================
// 프레임 디코드
// ============================================================

#[derive(Debug, Deserialize)]
struct RawFileRef {
    id: String,
}

/// 수신 프레임 중 봇이 읽는 필드
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    file_id: Option<String>,
    user_id: Option<String>,
    file: Option<RawFileRef>,
}

/// 텍스트 프레임 1개를 이벤트로 디코드
///
/// 잘못된 JSON, `type` 없는 응답 프레임, 필수 필드가 빠진 `file_shared`는 `None`.
pub fn parse_event(text: &str) -> Option<InboundEvent> {
    let frame: RawFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("프레임 파싱 실패: 건너뜀: {e}");
            return None;
        }
    };

    let Some(kind) = frame.kind else {
        debug!("type 없는 프레임 무시: {text}");
        return None;
    };

    match kind.as_str() {
        "hello" => Some(InboundEvent::Ready),
        "goodbye" => Some(InboundEvent::Goodbye),
        "file_shared" => {
            let file_id = frame.file_id.or(frame.file.map(|f| f.id));
            match (file_id, frame.user_id) {
                (Some(file_id), Some(user_id)) => {
                    Some(InboundEvent::FileShared(FileSharedEvent { file_id, user_id }))
                }
                _ => {
                    warn!("file_shared 필수 필드 누락: 건너뜀: {text}");
                    None
                }
            }
        }
        _ => Some(InboundEvent::Other(kind)),
    }
}

// ============================================================
// 커넥터
// ============================================================

/// 실시간 세션 커넥터: `RealtimeConnector` 포트 구현
pub struct RtmConnector {
    api: Arc<dyn MessagingApi>,
    keepalive: Option<Duration>,
}

impl RtmConnector {
    pub fn new(api: Arc<dyn MessagingApi>) -> Self {
        Self {
            api,
            keepalive: None,
        }
    }

    /// keepalive Ping 주기 설정
    ///
    /// 한 주기 안에 Pong(또는 다른 프레임)이 없으면 링크를 끊긴 것으로 처리한다.
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = Some(interval);
        self
    }

    /// `hello` 신호까지 대기
    ///
    /// 그 전에 도착한 이벤트는 버린다.
    async fn wait_for_ready(read: &mut SplitStream<WsStream>) -> Result<(), CoreError> {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match parse_event(text.as_str()) {
                    Some(InboundEvent::Ready) => return Ok(()),
                    Some(InboundEvent::Goodbye) => {
                        return Err(CoreError::Connect("ready 전에 goodbye 수신".to_string()))
                    }
                    Some(other) => debug!("ready 전 이벤트 무시: {other:?}"),
                    None => {}
                },
                Ok(Message::Close(frame)) => {
                    return Err(CoreError::Connect(format!("ready 전에 소켓 종료: {frame:?}")))
                }
                Ok(_) => {}
                Err(e) => return Err(CoreError::Connect(format!("WebSocket 수신 에러: {e}"))),
            }
        }
        Err(CoreError::Connect("ready 전에 스트림 종료".to_string()))
    }

    /// 수신 루프
    ///
    /// 소켓이 끝나거나 keepalive 응답이 끊기면 `Closed`를 보내고 종료한다.
    /// 수신자가 사라져도 종료.
    async fn read_loop(
        mut read: SplitStream<WsStream>,
        mut write: SplitSink<WsStream, Message>,
        keepalive: Option<Duration>,
        tx: mpsc::Sender<InboundEvent>,
    ) {
        let mut ticker =
            keepalive.map(|period| tokio::time::interval_at(Instant::now() + period, period));
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    let Some(msg) = msg else { break };
                    // 어떤 프레임이든 상대가 살아 있다는 신호
                    awaiting_pong = false;
                    match msg {
                        Ok(Message::Text(text)) => {
                            let Some(event) = parse_event(text.as_str()) else {
                                continue;
                            };
                            if tx.send(event).await.is_err() {
                                debug!("이벤트 수신자 없음: 수신 루프 종료");
                                return;
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            info!("WebSocket 종료 프레임 수신: {frame:?}");
                            break;
                        }
                        Ok(_) => {} // 상대 Ping 응답은 자동 처리
                        Err(e) => {
                            warn!("WebSocket 수신 에러: {e}");
                            break;
                        }
                    }
                }
                _ = next_tick(&mut ticker) => {
                    if awaiting_pong {
                        warn!("keepalive 응답 없음: 연결 끊김으로 처리");
                        break;
                    }
                    if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                        warn!("keepalive Ping 전송 실패: {e}");
                        break;
                    }
                    awaiting_pong = true;
                }
            }
        }
        let _ = tx.send(InboundEvent::Closed).await;
        debug!("WebSocket 수신 루프 종료");
    }
}

/// keepalive 다음 주기. 주기가 없으면 영원히 대기
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[async_trait]
impl RealtimeConnector for RtmConnector {
    async fn connect(&self) -> Result<RealtimeLink, CoreError> {
        let handshake = self.api.connect_realtime().await?;

        info!("WebSocket 연결: {}", handshake.url.split('?').next().unwrap_or(""));
        let (ws_stream, _) = tokio_tungstenite::connect_async(handshake.url.as_str())
            .await
            .map_err(|e| CoreError::Connect(format!("WebSocket 연결 실패: {e}")))?;

        // 송신 절반은 keepalive Ping 전용
        let (write, mut read) = ws_stream.split();
        Self::wait_for_ready(&mut read).await?;
        info!("실시간 세션 ready: self={}", handshake.self_id);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(Self::read_loop(read, write, self.keepalive, tx));

        Ok(RealtimeLink {
            self_id: handshake.self_id,
            events: rx,
        })
    }
}
