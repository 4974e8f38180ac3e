//! 봇 설정 구조체.
//!
//! 봇 토큰, 분류기 에셋, 오버레이 확대 비율, 세션 주기 등
//! 런타임 설정을 정의한다. 시작 시 한 번 로드되고 이후 읽기 전용.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;

/// 오버레이 확대 비율 상한 (박스 한 변의 5배)
pub const MAX_UP_SCALING_FACTOR: f64 = 4.0;

/// 최상위 봇 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Web API / 실시간 세션 인증 토큰
    pub bot_token: String,
    /// 얼굴 검출 분류기 파일 이름 (`assets_dir` 기준)
    pub classifier_file: String,
    /// 오버레이 확대 비율 (0.0 ~ `MAX_UP_SCALING_FACTOR`, 0.2 = 20% 확대)
    pub up_scaling_factor: f64,
    /// 업로드 대상 채널 이름
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    /// 처리 트리거 키워드 (코멘트에 포함되면 처리)
    #[serde(default = "default_trigger_keyword")]
    pub trigger_keyword: String,
    /// Web API 기본 URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// 에셋 디렉토리 (분류기 + `Images/face_N.png`)
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    /// 연결 상태 점검 주기 (밀리초)
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// 초기 연결 ready 신호 대기 시간 (초)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 시작 시 최대 연결 시도 횟수
    #[serde(default = "default_connect_max_attempts")]
    pub connect_max_attempts: u32,
    /// 재연결 대기 시작값 (밀리초, 시도마다 2배)
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// 이벤트 1건 처리 제한 시간 (초)
    #[serde(default = "default_pipeline_timeout_secs")]
    pub pipeline_timeout_secs: u64,
    /// 얼굴이 검출되지 않아도 원본을 다시 업로드할지
    #[serde(default)]
    pub upload_without_faces: bool,
}

impl BotConfig {
    /// 필수 필드만 지정한 설정 (나머지는 기본값)
    pub fn new(bot_token: &str, classifier_file: &str, up_scaling_factor: f64) -> Self {
        Self {
            bot_token: bot_token.to_string(),
            classifier_file: classifier_file.to_string(),
            up_scaling_factor,
            channel_name: default_channel_name(),
            trigger_keyword: default_trigger_keyword(),
            api_base_url: default_api_base_url(),
            assets_dir: default_assets_dir(),
            health_check_interval_ms: default_health_check_interval_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            connect_max_attempts: default_connect_max_attempts(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            pipeline_timeout_secs: default_pipeline_timeout_secs(),
            upload_without_faces: false,
        }
    }

    /// 설정값 유효성 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.bot_token.trim().is_empty() {
            return Err(CoreError::Config("botToken이 비어 있습니다".to_string()));
        }
        if self.classifier_file.trim().is_empty() {
            return Err(CoreError::Config(
                "classifierFile이 비어 있습니다".to_string(),
            ));
        }
        if !(0.0..=MAX_UP_SCALING_FACTOR).contains(&self.up_scaling_factor) {
            return Err(CoreError::Config(format!(
                "upScalingFactor는 0 이상 {MAX_UP_SCALING_FACTOR} 이하여야 합니다: {}",
                self.up_scaling_factor
            )));
        }
        if self.health_check_interval_ms == 0 {
            return Err(CoreError::Config(
                "healthCheckIntervalMs는 0보다 커야 합니다".to_string(),
            ));
        }
        if self.connect_max_attempts == 0 {
            return Err(CoreError::Config(
                "connectMaxAttempts는 1 이상이어야 합니다".to_string(),
            ));
        }
        Ok(())
    }

    /// 분류기 에셋 전체 경로
    pub fn classifier_path(&self) -> PathBuf {
        self.assets_dir.join(&self.classifier_file)
    }

    /// 오버레이 이미지 디렉토리
    pub fn overlay_dir(&self) -> PathBuf {
        self.assets_dir.join("Images")
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }
}

fn default_channel_name() -> String {
    "random".to_string()
}

fn default_trigger_keyword() -> String {
    "faceswapperbot".to_string()
}

fn default_api_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("Assets")
}

fn default_health_check_interval_ms() -> u64 {
    10_000
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_connect_max_attempts() -> u32 {
    5
}

fn default_reconnect_backoff_ms() -> u64 {
    2_000
}

fn default_pipeline_timeout_secs() -> u64 {
    60
}
