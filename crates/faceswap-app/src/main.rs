//! # faceswap-app
//!
//! 얼굴 교체 봇 바이너리 진입점.
//! 설정/에셋 로드, 어댑터 조립(DI), 세션 연결과 라이프사이클 관리.

mod lifecycle;
mod pipeline;
mod session;

use anyhow::Result;
use clap::Parser;
use faceswap_core::config::BotConfig;
use faceswap_core::config_manager::{ConfigManager, CONFIG_FILE_NAME};
use faceswap_core::error::CoreError;
use faceswap_core::ports::messaging::MessagingApi;
use faceswap_network::connectivity::ConnectivityTracker;
use faceswap_network::http_client::SlackWebClient;
use faceswap_network::ws_client::RtmConnector;
use faceswap_vision::codec::PngCodec;
use faceswap_vision::compositor::Compositor;
use faceswap_vision::detector::CascadeDetector;
use faceswap_vision::overlay::OverlayLibrary;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::lifecycle::LifecycleManager;
use crate::pipeline::{MediaPipeline, PipelineSettings};
use crate::session::{resolve_channel_ids, SessionManager, SessionSettings};

/// Web API 요청 타임아웃
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// 종료 시 진행 중인 이벤트를 기다리는 추가 여유
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 얼굴 교체 봇
///
/// 채널에 올라온 이미지의 얼굴을 오버레이로 바꿔 다시 올린다.
#[derive(Parser, Debug)]
#[command(name = "faceswap-bot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (JSON)
    #[arg(long, short = 'c', default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// 에셋 디렉토리 (설정의 assetsDir 대신 사용)
    #[arg(long, short = 'a')]
    assets: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// 업로드 대상 채널 이름 (설정의 channelName 대신 사용)
    #[arg(long)]
    channel: Option<String>,
}

fn init_tracing(log_level: &str) {
    let log_filter = format!(
        "faceswap_bot={0},faceswap_core={0},faceswap_vision={0},faceswap_network={0}",
        log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();
}

/// 설정 로드 + CLI 오버라이드
fn load_config(args: &Args) -> Result<BotConfig, CoreError> {
    let mut config = ConfigManager::load(&args.config)?.into_config();

    if let Some(ref assets) = args.assets {
        config.assets_dir = assets.clone();
    }
    if let Some(ref channel) = args.channel {
        config.channel_name = channel.clone();
    }
    config.validate()?;
    Ok(config)
}

/// 분류기 + 오버레이 로드 (오버레이 0장이면 시작 불가)
fn load_assets(config: &BotConfig) -> Result<(CascadeDetector, OverlayLibrary), CoreError> {
    let detector = CascadeDetector::load(&config.classifier_path())?;
    let overlays = OverlayLibrary::load(&config.overlay_dir())?;
    if overlays.is_empty() {
        return Err(CoreError::Load(format!(
            "오버레이 이미지 없음: {}",
            config.overlay_dir().display()
        )));
    }
    Ok((detector, overlays))
}

/// 에러 → 프로세스 종료 코드
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CoreError>()
        .map(CoreError::exit_code)
        .unwrap_or(1)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    info!(
        "설정: 채널=#{}, 에셋={}, 확대={}",
        config.channel_name,
        config.assets_dir.display(),
        config.up_scaling_factor
    );

    // 1. 에셋
    let (detector, overlays) = load_assets(&config)?;

    // 2. 네트워크 어댑터
    let api: Arc<dyn MessagingApi> = Arc::new(SlackWebClient::new(
        &config.api_base_url,
        &config.bot_token,
        HTTP_TIMEOUT,
    )?);
    // 헬스체크 주기마다 Ping, 응답 없으면 끊긴 링크로 처리
    let connector =
        Arc::new(RtmConnector::new(api.clone()).with_keepalive(config.health_check_interval()));
    let tracker = Arc::new(ConnectivityTracker::new());

    // 3. 파이프라인
    let pipeline = Arc::new(MediaPipeline::new(
        api.clone(),
        Arc::new(detector),
        Arc::new(PngCodec),
        Arc::new(overlays),
        Arc::new(Compositor::from_entropy()),
        PipelineSettings::from(&config),
    ));

    // 4. 세션
    let session = Arc::new(SessionManager::new(
        connector,
        pipeline,
        tracker,
        SessionSettings::from(&config),
    ));
    let lifecycle = Arc::new(LifecycleManager::new());

    // ── 연결 ──
    let self_id = tokio::select! {
        result = session.connect_with_retry() => result?,
        _ = lifecycle.wait_for_signal() => {
            info!("연결 중 종료 요청");
            session.close().await;
            return Ok(());
        }
    };

    let channel_ids = resolve_channel_ids(api.as_ref(), &config.channel_name).await?;
    session.set_channels(channel_ids).await;

    // ── 태스크 시작 ──
    let health_task =
        session.spawn_health_check(config.health_check_interval(), lifecycle.subscribe());

    let dispatch_task = {
        let session = session.clone();
        let shutdown_rx = lifecycle.subscribe();
        tokio::spawn(async move { session.run(shutdown_rx).await })
    };

    info!("봇 실행 중 (self={self_id}, Ctrl+C로 종료)");

    // OS 시그널 대기
    lifecycle.wait_for_signal().await;

    // 진행 중인 이벤트는 제한 시간 안에서 마무리
    let grace = config.pipeline_timeout() + SHUTDOWN_GRACE;
    if tokio::time::timeout(grace, dispatch_task).await.is_err() {
        warn!("디스패치 루프 종료 대기 시간 초과");
    }
    if let Err(e) = health_task.await {
        warn!("헬스체크 태스크 비정상 종료: {e}");
    }
    session.close().await;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!("faceswap-bot 시작");
    match run(args).await {
        Ok(()) => {
            info!("faceswap-bot 종료");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("시작 실패: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}
