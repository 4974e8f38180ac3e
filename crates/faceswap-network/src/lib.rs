//! # faceswap-network
//!
//! 메시징 서비스 네트워크 어댑터.
//! Web API(REST) 호출과 실시간 WebSocket 세션을 담당하며
//! 연결 상태를 `watch` 채널로 발행한다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use faceswap_network::http_client::SlackWebClient;
//! use faceswap_network::ws_client::RtmConnector;
//!
//! let api = Arc::new(SlackWebClient::new(base_url, token, timeout)?);
//! let connector = RtmConnector::new(api.clone()).with_keepalive(interval);
//! let link = connector.connect().await?;
//! ```

pub mod connectivity;
pub mod http_client;
pub mod ws_client;
