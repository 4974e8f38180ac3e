//! 실시간 세션 관리.
//!
//! 연결 수립/재연결, 주기적 연결 점검, 파일 공유 이벤트 디스패치.
//! 연결 상태 전환(자기 ID, 채널 목록, 수신 태스크 교체)은 모두
//! 하나의 `tokio::sync::Mutex` 안에서 일어난다. 파이프라인 실행은
//! 스냅샷만 들고 잠금 밖에서 돈다.

use faceswap_core::config::BotConfig;
use faceswap_core::error::CoreError;
use faceswap_core::models::event::{FileSharedEvent, InboundEvent};
use faceswap_core::ports::handler::{FileSharedHandler, PipelineOutcome, SessionContext};
use faceswap_core::ports::messaging::{MessagingApi, RealtimeConnector};
use faceswap_network::connectivity::SharedConnectivityTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 재연결 대기 상한
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 디스패치 대기열 크기
const DISPATCH_QUEUE: usize = 64;

/// 세션 설정
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// ready 신호까지 대기 시간
    pub connect_timeout: Duration,
    /// 시작 시 최대 연결 시도 횟수
    pub connect_max_attempts: u32,
    /// 재연결 대기 시작값 (시도마다 2배)
    pub reconnect_backoff: Duration,
    /// 이벤트 1건 처리 제한 시간
    pub pipeline_timeout: Duration,
}

impl From<&BotConfig> for SessionSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            connect_max_attempts: config.connect_max_attempts,
            reconnect_backoff: config.reconnect_backoff(),
            pipeline_timeout: config.pipeline_timeout(),
        }
    }
}

/// 연결 점검 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheckOutcome {
    /// 연결 유지 중
    Alive,
    /// 끊김 감지 후 재연결 성공
    Reconnected,
    /// 재연결 실패 (다음 주기에 다시 시도)
    ReconnectFailed,
}

/// 이벤트 1건 디스패치 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 봇 자신이 올린 파일
    IgnoredOwnUpload,
    Completed(PipelineOutcome),
    /// 파이프라인 에러 (로그 후 폐기)
    Failed,
    /// 제한 시간 초과 (로그 후 폐기)
    TimedOut,
}

/// 잠금으로 보호되는 연결 상태
#[derive(Default)]
struct ConnectionState {
    self_id: Option<String>,
    channel_ids: Vec<String>,
    forwarder: Option<JoinHandle<()>>,
}

/// 세션 관리자
pub struct SessionManager {
    connector: Arc<dyn RealtimeConnector>,
    handler: Arc<dyn FileSharedHandler>,
    tracker: SharedConnectivityTracker,
    settings: SessionSettings,
    state: Arc<Mutex<ConnectionState>>,
    /// 링크가 바뀌어도 유지되는 디스패치 대기열
    queue_tx: mpsc::Sender<FileSharedEvent>,
    queue_rx: Mutex<Option<mpsc::Receiver<FileSharedEvent>>>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn RealtimeConnector>,
        handler: Arc<dyn FileSharedHandler>,
        tracker: SharedConnectivityTracker,
        settings: SessionSettings,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(DISPATCH_QUEUE);
        Self {
            connector,
            handler,
            tracker,
            settings,
            state: Arc::new(Mutex::new(ConnectionState::default())),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
        }
    }

    /// 업로드 대상 채널 설정
    pub async fn set_channels(&self, channel_ids: Vec<String>) {
        let mut state = self.state.lock().await;
        info!("업로드 대상 채널: {:?}", channel_ids);
        state.channel_ids = channel_ids;
    }

    /// 현재 세션 스냅샷
    pub async fn context(&self) -> SessionContext {
        let state = self.state.lock().await;
        SessionContext {
            self_id: state.self_id.clone().unwrap_or_default(),
            channel_ids: state.channel_ids.clone(),
        }
    }

    pub fn tracker(&self) -> &SharedConnectivityTracker {
        &self.tracker
    }

    /// 연결 1회 시도: 성공 시 봇 자신의 ID 반환
    pub async fn connect(&self) -> Result<String, CoreError> {
        let mut state = self.state.lock().await;
        self.connect_locked(&mut state).await
    }

    async fn connect_locked(&self, state: &mut ConnectionState) -> Result<String, CoreError> {
        if let Some(forwarder) = state.forwarder.take() {
            forwarder.abort();
        }

        let epoch = self.tracker.begin_attempt();
        let timeout = self.settings.connect_timeout;
        let result = match tokio::time::timeout(timeout, self.connector.connect()).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(link) => {
                self.tracker.mark_connected(epoch);
                info!("실시간 세션 연결됨: self={}", link.self_id);
                state.self_id = Some(link.self_id.clone());
                state.forwarder = Some(self.spawn_forwarder(link.events, epoch));
                Ok(link.self_id)
            }
            Err(e) => {
                self.tracker.mark_failed(epoch);
                Err(e)
            }
        }
    }

    /// 링크 이벤트를 디스패치 대기열로 옮기는 태스크
    ///
    /// 링크가 끝나면 해당 세대의 연결을 끊김으로 기록한다.
    fn spawn_forwarder(
        &self,
        mut events: mpsc::Receiver<InboundEvent>,
        epoch: u64,
    ) -> JoinHandle<()> {
        let queue = self.queue_tx.clone();
        let state = self.state.clone();
        let tracker = self.tracker.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    InboundEvent::FileShared(shared) => {
                        if queue.send(shared).await.is_err() {
                            debug!("디스패치 대기열 닫힘");
                            return;
                        }
                    }
                    InboundEvent::Goodbye => info!("서버 goodbye 수신"),
                    InboundEvent::Closed => break,
                    InboundEvent::Ready => {}
                    InboundEvent::Other(kind) => debug!("처리하지 않는 이벤트: {kind}"),
                }
            }

            let _guard = state.lock().await;
            tracker.mark_disconnected(epoch);
        })
    }

    /// 시작 시 연결: 실패하면 대기 시간을 2배씩 늘리며 재시도
    pub async fn connect_with_retry(&self) -> Result<String, CoreError> {
        let max_attempts = self.settings.connect_max_attempts.max(1);
        let mut delay = self.settings.reconnect_backoff;
        let mut attempt = 1;

        loop {
            match self.connect().await {
                Ok(self_id) => return Ok(self_id),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        "연결 실패 (시도 {attempt}/{max_attempts}): {e}, {delay:?} 후 재시도"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(e) => {
                    error!("연결 실패 ({max_attempts}회 시도): {e}");
                    return Err(CoreError::Connect(format!(
                        "{max_attempts}회 시도 후 연결 실패: {e}"
                    )));
                }
            }
        }
    }

    /// 연결 점검 1회
    ///
    /// 에러를 밖으로 내보내지 않는다.
    pub async fn health_check_tick(&self) -> HealthCheckOutcome {
        let mut state = self.state.lock().await;
        if self.tracker.is_connected() {
            debug!("연결 점검: 정상");
            return HealthCheckOutcome::Alive;
        }

        info!("연결 끊김 감지, 재연결 시도");
        match self.connect_locked(&mut state).await {
            Ok(_) => HealthCheckOutcome::Reconnected,
            Err(e) => {
                warn!("재연결 실패: {e}");
                HealthCheckOutcome::ReconnectFailed
            }
        }
    }

    /// 주기적 연결 점검 태스크
    ///
    /// 종료 신호는 대기 중에도, 진행 중인 재연결 도중에도 즉시 반영된다.
    pub fn spawn_health_check(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // 첫 틱은 즉시 발생하므로 건너뜀
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
                tokio::select! {
                    outcome = session.health_check_tick() => {
                        debug!("연결 점검 결과: {outcome:?}");
                    }
                    _ = shutdown_rx.changed() => {
                        info!("종료 요청: 진행 중인 재연결 취소");
                        break;
                    }
                }
            }
            info!("연결 점검 루프 종료");
        })
    }

    /// 이벤트 1건 디스패치
    ///
    /// 파이프라인 에러와 시간 초과는 로그만 남기고 세션은 계속된다.
    pub async fn dispatch(&self, event: &FileSharedEvent) -> DispatchOutcome {
        let context = self.context().await;

        if event.user_id == context.self_id {
            debug!("[{}] 봇 자신의 업로드, 무시", event.file_id);
            return DispatchOutcome::IgnoredOwnUpload;
        }

        let timeout = self.settings.pipeline_timeout;
        match tokio::time::timeout(timeout, self.handler.handle(event, &context)).await {
            Ok(Ok(outcome)) => {
                match &outcome {
                    PipelineOutcome::Uploaded { faces, filename } => {
                        info!("[{}] 업로드 완료: {filename} (얼굴 {faces}개)", event.file_id)
                    }
                    PipelineOutcome::NoFaces => info!("[{}] 얼굴 없음, 업로드 생략", event.file_id),
                    PipelineOutcome::NotEligible => {
                        debug!("[{}] 처리 대상 아님", event.file_id)
                    }
                }
                DispatchOutcome::Completed(outcome)
            }
            Ok(Err(e)) => {
                warn!("[{}] 처리 실패: {e}", event.file_id);
                DispatchOutcome::Failed
            }
            Err(_) => {
                warn!("[{}] 처리 시간 초과 ({timeout:?})", event.file_id);
                DispatchOutcome::TimedOut
            }
        }
    }

    /// 디스패치 루프: 대기열의 이벤트를 하나씩 처리
    ///
    /// 한 번만 실행할 수 있다.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let Some(mut queue) = self.queue_rx.lock().await.take() else {
            warn!("디스패치 루프가 이미 실행 중");
            return;
        };
        info!("디스패치 루프 시작");

        loop {
            tokio::select! {
                event = queue.recv() => {
                    let Some(event) = event else { break };
                    self.dispatch(&event).await;
                }
                _ = shutdown_rx.changed() => {
                    info!("디스패치 루프 종료");
                    break;
                }
            }
        }
    }

    /// 수신 태스크 정리
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(forwarder) = state.forwarder.take() {
            forwarder.abort();
        }
        let stats = self.tracker.stats();
        info!(
            "세션 종료: 상태={}, 누적 연결 {}회, 마지막 연결={}",
            stats.status,
            stats.connect_count,
            stats
                .last_connected
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "없음".to_string())
        );
    }
}

/// 채널 이름으로 업로드 대상 채널 ID 조회
///
/// `#` 접두사는 무시한다. 일치하는 채널이 없으면 `CoreError::Config`.
pub async fn resolve_channel_ids(
    api: &dyn MessagingApi,
    channel_name: &str,
) -> Result<Vec<String>, CoreError> {
    let wanted = channel_name.trim_start_matches('#');
    let ids: Vec<String> = api
        .list_channels()
        .await?
        .into_iter()
        .filter(|c| c.name == wanted)
        .map(|c| c.id)
        .collect();

    if ids.is_empty() {
        return Err(CoreError::Config(format!("채널을 찾을 수 없음: #{wanted}")));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use faceswap_core::models::file::{Channel, FileInfo, FileUpload};
    use faceswap_core::models::session::{ConnectionStatus, RealtimeHandshake};
    use faceswap_core::ports::messaging::RealtimeLink;
    use faceswap_network::connectivity::ConnectivityTracker;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ============================================================
    // Fakes
    // ============================================================

    enum Script {
        Link(mpsc::Receiver<InboundEvent>),
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct FakeConnector {
        attempts: AtomicUsize,
        script: parking_lot::Mutex<VecDeque<Script>>,
    }

    impl FakeConnector {
        fn push_link(&self) -> mpsc::Sender<InboundEvent> {
            let (tx, rx) = mpsc::channel(16);
            self.script.lock().push_back(Script::Link(rx));
            tx
        }

        fn push(&self, script: Script) {
            self.script.lock().push_back(script);
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RealtimeConnector for FakeConnector {
        async fn connect(&self) -> Result<RealtimeLink, CoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().pop_front();
            match next {
                Some(Script::Link(events)) => Ok(RealtimeLink {
                    self_id: "UBOT".to_string(),
                    events,
                }),
                Some(Script::Hang) => std::future::pending().await,
                Some(Script::Fail) | None => Err(CoreError::Connect("refused".to_string())),
            }
        }
    }

    struct FakeHandler {
        calls: AtomicUsize,
        seen: parking_lot::Mutex<Vec<(FileSharedEvent, SessionContext)>>,
        delay: Duration,
        fail: bool,
    }

    impl FakeHandler {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen: parking_lot::Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FileSharedHandler for FakeHandler {
        async fn handle(
            &self,
            event: &FileSharedEvent,
            session: &SessionContext,
        ) -> Result<PipelineOutcome, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push((event.clone(), session.clone()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(CoreError::Download("boom".to_string()));
            }
            Ok(PipelineOutcome::Uploaded {
                faces: 1,
                filename: format!("{}_swapped.png", event.file_id),
            })
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            connect_timeout: Duration::from_millis(100),
            connect_max_attempts: 3,
            reconnect_backoff: Duration::from_millis(1),
            pipeline_timeout: Duration::from_secs(5),
        }
    }

    fn session_with(
        connector: Arc<FakeConnector>,
        handler: Arc<FakeHandler>,
        settings: SessionSettings,
    ) -> SessionManager {
        SessionManager::new(
            connector,
            handler,
            Arc::new(ConnectivityTracker::new()),
            settings,
        )
    }

    async fn wait_for_status(session: &SessionManager, expected: ConnectionStatus) {
        let mut rx = session.tracker().subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            while *rx.borrow_and_update() != expected {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("상태 전환 대기 시간 초과");
    }

    async fn wait_for_attempts(connector: &FakeConnector, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while connector.attempts() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("연결 시도 대기 시간 초과");
    }

    // ============================================================
    // 연결
    // ============================================================

    #[tokio::test]
    async fn connect_records_self_id() {
        let connector = Arc::new(FakeConnector::default());
        let _link = connector.push_link();
        let session = session_with(connector.clone(), Arc::new(FakeHandler::new()), settings());

        let self_id = session.connect().await.unwrap();
        assert_eq!(self_id, "UBOT");
        assert_eq!(session.context().await.self_id, "UBOT");
        assert_eq!(session.tracker().status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn connect_without_ready_times_out() {
        let connector = Arc::new(FakeConnector::default());
        connector.push(Script::Hang);
        let session = session_with(connector, Arc::new(FakeHandler::new()), settings());

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, CoreError::Timeout { timeout_ms: 100 }));
        assert_eq!(session.tracker().status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn retry_succeeds_after_failures() {
        let connector = Arc::new(FakeConnector::default());
        connector.push(Script::Fail);
        connector.push(Script::Fail);
        let _link = connector.push_link();
        let session = session_with(connector.clone(), Arc::new(FakeHandler::new()), settings());

        assert_eq!(session.connect_with_retry().await.unwrap(), "UBOT");
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test]
    async fn retry_budget_exhausted_is_connect_error() {
        let connector = Arc::new(FakeConnector::default());
        let session = session_with(connector.clone(), Arc::new(FakeHandler::new()), settings());

        let err = session.connect_with_retry().await.unwrap_err();
        assert!(matches!(err, CoreError::Connect(_)));
        assert_eq!(err.exit_code(), 4);
        assert_eq!(connector.attempts(), 3);
    }

    // ============================================================
    // 디스패치
    // ============================================================

    #[tokio::test]
    async fn own_upload_is_ignored() {
        let connector = Arc::new(FakeConnector::default());
        let _link = connector.push_link();
        let handler = Arc::new(FakeHandler::new());
        let session = session_with(connector, handler.clone(), settings());
        session.connect().await.unwrap();

        let outcome = session.dispatch(&FileSharedEvent::new("F1", "UBOT")).await;
        assert_eq!(outcome, DispatchOutcome::IgnoredOwnUpload);
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn other_user_upload_reaches_handler_with_context() {
        let connector = Arc::new(FakeConnector::default());
        let _link = connector.push_link();
        let handler = Arc::new(FakeHandler::new());
        let session = session_with(connector, handler.clone(), settings());
        session.connect().await.unwrap();
        session.set_channels(vec!["C1".to_string()]).await;

        let outcome = session.dispatch(&FileSharedEvent::new("F1", "UHUMAN")).await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Completed(PipelineOutcome::Uploaded { faces: 1, .. })
        ));

        let seen = handler.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1.self_id, "UBOT");
        assert_eq!(seen[0].1.channel_ids, vec!["C1".to_string()]);
    }

    #[tokio::test]
    async fn handler_error_is_contained() {
        let connector = Arc::new(FakeConnector::default());
        let _link = connector.push_link();
        let mut handler = FakeHandler::new();
        handler.fail = true;
        let handler = Arc::new(handler);
        let session = session_with(connector, handler.clone(), settings());
        session.connect().await.unwrap();

        assert_eq!(
            session.dispatch(&FileSharedEvent::new("F1", "U1")).await,
            DispatchOutcome::Failed
        );
        // 다음 이벤트도 계속 처리
        assert_eq!(
            session.dispatch(&FileSharedEvent::new("F2", "U1")).await,
            DispatchOutcome::Failed
        );
        assert_eq!(handler.calls(), 2);
    }

    #[tokio::test]
    async fn slow_pipeline_hits_deadline() {
        let connector = Arc::new(FakeConnector::default());
        let _link = connector.push_link();
        let mut handler = FakeHandler::new();
        handler.delay = Duration::from_secs(5);
        let mut settings = settings();
        settings.pipeline_timeout = Duration::from_millis(20);
        let session = session_with(connector, Arc::new(handler), settings);
        session.connect().await.unwrap();

        assert_eq!(
            session.dispatch(&FileSharedEvent::new("F1", "U1")).await,
            DispatchOutcome::TimedOut
        );
    }

    // ============================================================
    // 연결 점검
    // ============================================================

    #[tokio::test]
    async fn health_check_alive_does_not_reconnect() {
        let connector = Arc::new(FakeConnector::default());
        let _link = connector.push_link();
        let session = session_with(connector.clone(), Arc::new(FakeHandler::new()), settings());
        session.connect().await.unwrap();

        assert_eq!(session.health_check_tick().await, HealthCheckOutcome::Alive);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn health_check_reconnects_after_socket_close() {
        let connector = Arc::new(FakeConnector::default());
        let link = connector.push_link();
        let _second = connector.push_link();
        let session = session_with(connector.clone(), Arc::new(FakeHandler::new()), settings());
        session.connect().await.unwrap();

        link.send(InboundEvent::Closed).await.unwrap();
        wait_for_status(&session, ConnectionStatus::Disconnected).await;

        assert_eq!(session.health_check_tick().await, HealthCheckOutcome::Reconnected);
        assert_eq!(connector.attempts(), 2);
        assert_eq!(session.tracker().status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn health_check_failure_is_reported_not_raised() {
        let connector = Arc::new(FakeConnector::default());
        let link = connector.push_link();
        let session = session_with(connector.clone(), Arc::new(FakeHandler::new()), settings());
        session.connect().await.unwrap();

        drop(link);
        wait_for_status(&session, ConnectionStatus::Disconnected).await;

        assert_eq!(
            session.health_check_tick().await,
            HealthCheckOutcome::ReconnectFailed
        );
        assert_eq!(session.tracker().status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn health_check_task_reconnects_on_its_timer() {
        let connector = Arc::new(FakeConnector::default());
        let link = connector.push_link();
        let _second = connector.push_link();
        let session = Arc::new(session_with(
            connector.clone(),
            Arc::new(FakeHandler::new()),
            settings(),
        ));
        session.connect().await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = session.spawn_health_check(Duration::from_millis(20), shutdown_rx);

        link.send(InboundEvent::Closed).await.unwrap();
        // 다음 주기에 타이머가 재연결
        wait_for_attempts(&connector, 2).await;
        wait_for_status(&session, ConnectionStatus::Connected).await;
        assert_eq!(connector.attempts(), 2);
        assert_eq!(session.tracker().stats().connect_count, 2);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("점검 태스크가 종료되지 않음")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_cancels_reconnect_in_flight() {
        let connector = Arc::new(FakeConnector::default());
        let link = connector.push_link();
        connector.push(Script::Hang);
        let mut settings = settings();
        settings.connect_timeout = Duration::from_secs(30);
        let session = Arc::new(session_with(
            connector.clone(),
            Arc::new(FakeHandler::new()),
            settings,
        ));
        session.connect().await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = session.spawn_health_check(Duration::from_millis(20), shutdown_rx);

        drop(link);
        // 재연결 시도가 멈춰 있는 동안 종료 요청
        wait_for_attempts(&connector, 2).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("재연결 중 종료가 지연됨")
            .unwrap();
    }

    // ============================================================
    // 디스패치 루프
    // ============================================================

    #[tokio::test]
    async fn run_loop_processes_link_events_until_shutdown() {
        let connector = Arc::new(FakeConnector::default());
        let link = connector.push_link();
        let handler = Arc::new(FakeHandler::new());
        let session = Arc::new(session_with(connector, handler.clone(), settings()));
        session.connect().await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = {
            let session = session.clone();
            tokio::spawn(async move { session.run(shutdown_rx).await })
        };

        link.send(InboundEvent::Other("user_typing".to_string()))
            .await
            .unwrap();
        link.send(InboundEvent::FileShared(FileSharedEvent::new("F1", "UHUMAN")))
            .await
            .unwrap();
        link.send(InboundEvent::FileShared(FileSharedEvent::new("F2", "UBOT")))
            .await
            .unwrap();
        link.send(InboundEvent::FileShared(FileSharedEvent::new("F3", "UHUMAN")))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while handler.calls() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .unwrap()
            .unwrap();

        let files: Vec<String> = handler
            .seen
            .lock()
            .iter()
            .map(|(e, _)| e.file_id.clone())
            .collect();
        assert_eq!(files, vec!["F1".to_string(), "F3".to_string()]);
    }

    // ============================================================
    // 채널 조회
    // ============================================================

    struct ChannelApi;

    #[async_trait]
    impl MessagingApi for ChannelApi {
        async fn connect_realtime(&self) -> Result<RealtimeHandshake, CoreError> {
            Err(CoreError::Connect("unused".to_string()))
        }

        async fn list_channels(&self) -> Result<Vec<Channel>, CoreError> {
            Ok(vec![
                Channel {
                    id: "C1".to_string(),
                    name: "general".to_string(),
                },
                Channel {
                    id: "C2".to_string(),
                    name: "random".to_string(),
                },
            ])
        }

        async fn file_info(&self, _file_id: &str) -> Result<FileInfo, CoreError> {
            Err(CoreError::Metadata("unused".to_string()))
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>, CoreError> {
            Err(CoreError::Download("unused".to_string()))
        }

        async fn upload(&self, _upload: &FileUpload) -> Result<(), CoreError> {
            Err(CoreError::Upload("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn channel_resolved_by_name() {
        assert_eq!(
            resolve_channel_ids(&ChannelApi, "random").await.unwrap(),
            vec!["C2".to_string()]
        );
        assert_eq!(
            resolve_channel_ids(&ChannelApi, "#general").await.unwrap(),
            vec!["C1".to_string()]
        );
        assert!(matches!(
            resolve_channel_ids(&ChannelApi, "missing").await,
            Err(CoreError::Config(_))
        ));
    }
}
