//! 연결 상태 추적.
//!
//! 실시간 세션의 연결 상태를 `watch` 채널로 발행한다.
//! 연결 시도마다 세대(epoch)를 올려, 이전 링크의 종료 신호가
//! 새 연결 상태를 덮어쓰지 못하게 한다.

use chrono::{DateTime, Utc};
use faceswap_core::models::session::ConnectionStatus;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 연결 상태 추적기
pub struct ConnectivityTracker {
    /// 상태 변경 브로드캐스트
    status_tx: watch::Sender<ConnectionStatus>,
    /// 현재 연결 시도 세대
    epoch: AtomicU64,
    /// 연속 연결 실패 횟수
    failure_count: AtomicU64,
    /// 누적 연결 성공 횟수
    connect_count: AtomicU64,
    /// 마지막 연결 성공 시각
    last_connected: Mutex<Option<DateTime<Utc>>>,
}

impl ConnectivityTracker {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            status_tx,
            epoch: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            connect_count: AtomicU64::new(0),
            last_connected: Mutex::new(None),
        }
    }

    /// 현재 연결 상태
    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// 상태 변경 수신기 생성
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// 새 연결 시도 시작: `Connecting`으로 전환하고 새 세대 반환
    pub fn begin_attempt(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(ConnectionStatus::Connecting);
        debug!("연결 시도 시작 (세대 {epoch})");
        epoch
    }

    /// 연결 성공 기록
    ///
    /// 다른 시도가 이미 시작됐으면 무시하고 false.
    pub fn mark_connected(&self, epoch: u64) -> bool {
        if !self.is_current(epoch) {
            return false;
        }
        self.failure_count.store(0, Ordering::SeqCst);
        let total = self.connect_count.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_connected.lock() = Some(Utc::now());
        self.publish(ConnectionStatus::Connected);
        if total > 1 {
            info!("실시간 세션 재연결됨 (누적 {total}회 연결)");
        }
        true
    }

    /// 연결 실패 기록
    pub fn mark_failed(&self, epoch: u64) -> bool {
        if !self.is_current(epoch) {
            return false;
        }
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        warn!("연결 실패 (연속 {count}회)");
        self.publish(ConnectionStatus::Disconnected);
        true
    }

    /// 연결 끊김 기록 (소켓 종료, goodbye)
    ///
    /// 이전 세대의 링크가 보낸 신호는 무시한다.
    pub fn mark_disconnected(&self, epoch: u64) -> bool {
        if !self.is_current(epoch) {
            debug!("이전 세대({epoch}) 끊김 신호 무시");
            return false;
        }
        if self.status() == ConnectionStatus::Connected {
            warn!("실시간 세션 끊김: 다음 점검 주기에 재연결");
        }
        self.publish(ConnectionStatus::Disconnected);
        true
    }

    /// 연속 실패 횟수
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// 연결 상태 통계
    pub fn stats(&self) -> ConnectivityStats {
        ConnectivityStats {
            status: self.status(),
            failure_count: self.failure_count(),
            connect_count: self.connect_count.load(Ordering::SeqCst),
            last_connected: *self.last_connected.lock(),
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn publish(&self, status: ConnectionStatus) {
        self.status_tx.send_replace(status);
    }
}

impl Default for ConnectivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// 연결 상태 통계
#[derive(Debug, Clone)]
pub struct ConnectivityStats {
    pub status: ConnectionStatus,
    /// 연속 실패 횟수
    pub failure_count: u64,
    /// 누적 연결 성공 횟수
    pub connect_count: u64,
    pub last_connected: Option<DateTime<Utc>>,
}

/// Arc로 감싼 ConnectivityTracker
pub type SharedConnectivityTracker = Arc<ConnectivityTracker>;
