//! 설정 파일 로드.
//!
//! 작업 디렉토리의 JSON 설정 파일(기본 `config.ini`)을 읽어
//! 환경 변수 오버라이드 적용 후 검증한다.

use crate::config::BotConfig;
use crate::error::CoreError;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// 기본 설정 파일 이름 (내용은 JSON)
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// 봇 토큰 오버라이드 환경 변수
pub const TOKEN_ENV_VAR: &str = "FACESWAP_BOT_TOKEN";

/// 설정 관리자
///
/// 로드 이후 설정은 불변이다.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: BotConfig,
}

impl ConfigManager {
    /// 지정된 경로에서 로드
    pub fn load(config_path: &Path) -> Result<Self, CoreError> {
        let token_override = std::env::var(TOKEN_ENV_VAR).ok();
        Self::load_with_token_override(config_path, token_override)
    }

    /// 토큰 오버라이드를 명시적으로 받아 로드 (테스트에서 환경 변수 없이 사용)
    pub fn load_with_token_override(
        config_path: &Path,
        token_override: Option<String>,
    ) -> Result<Self, CoreError> {
        let mut config = Self::load_from_file(config_path)?;

        if let Some(token) = token_override.filter(|t| !t.trim().is_empty()) {
            debug!("{TOKEN_ENV_VAR} 환경 변수로 botToken 오버라이드");
            config.bot_token = token;
        }

        config.validate()?;
        info!("설정 로드 완료: {}", config_path.display());

        Ok(Self { config })
    }

    /// 설정 소유권 반환
    pub fn into_config(self) -> BotConfig {
        self.config
    }

    /// 파일에서 설정 로드
    fn load_from_file(path: &Path) -> Result<BotConfig, CoreError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("설정 파일 읽기 실패: {}: {}", path.display(), e))
        })?;

        let config: BotConfig = serde_json::from_str(&content).map_err(|e| {
            CoreError::Config(format!("설정 파일 파싱 실패: {}: {}", path.display(), e))
        })?;

        debug!("설정 파일 파싱 완료: {}", path.display());
        Ok(config)
    }
}
