//! 파일 공유 이벤트 처리 파이프라인.
//!
//! 메타데이터 → 처리 대상 판정 → 다운로드 → 디코드 → 그레이스케일/평활화
//! → 얼굴 검출 → 오버레이 합성 → PNG 인코딩 → 업로드.
//! CPU 작업(디코드~인코딩)은 `spawn_blocking`에서 실행한다.

use async_trait::async_trait;
use faceswap_core::config::BotConfig;
use faceswap_core::error::CoreError;
use faceswap_core::models::event::FileSharedEvent;
use faceswap_core::models::file::FileUpload;
use faceswap_core::ports::handler::{FileSharedHandler, PipelineOutcome, SessionContext};
use faceswap_core::ports::messaging::MessagingApi;
use faceswap_core::ports::vision::{FaceDetector, ImageCodec};
use faceswap_vision::compositor::Compositor;
use faceswap_vision::normalize::normalize_for_detection;
use faceswap_vision::overlay::OverlayLibrary;
use std::sync::Arc;
use tracing::debug;

/// 파이프라인 동작 설정
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// 오버레이 확대 비율
    pub upscale: f64,
    /// 처리 트리거 키워드
    pub trigger_keyword: String,
    /// 얼굴이 없어도 재업로드할지
    pub upload_without_faces: bool,
}

impl From<&BotConfig> for PipelineSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            upscale: config.up_scaling_factor,
            trigger_keyword: config.trigger_keyword.clone(),
            upload_without_faces: config.upload_without_faces,
        }
    }
}

/// 얼굴 교체 결과
#[derive(Debug)]
pub struct SwapResult {
    /// 합성한 얼굴 수
    pub faces: usize,
    /// PNG 바이트
    pub png: Vec<u8>,
}

/// 이미지 변환 단계 (동기)
pub struct FaceSwapper {
    detector: Arc<dyn FaceDetector>,
    codec: Arc<dyn ImageCodec>,
    overlays: Arc<OverlayLibrary>,
    compositor: Arc<Compositor>,
    upscale: f64,
}

impl FaceSwapper {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        codec: Arc<dyn ImageCodec>,
        overlays: Arc<OverlayLibrary>,
        compositor: Arc<Compositor>,
        upscale: f64,
    ) -> Self {
        Self {
            detector,
            codec,
            overlays,
            compositor,
            upscale,
        }
    }

    /// 원본 바이트 → 합성 PNG
    ///
    /// 얼굴이 없고 `keep_without_faces`가 false면 `None`.
    pub fn swap(
        &self,
        bytes: &[u8],
        keep_without_faces: bool,
    ) -> Result<Option<SwapResult>, CoreError> {
        let image = self.codec.decode(bytes)?;
        let gray = normalize_for_detection(&image);
        let faces = self.detector.detect(&gray);
        debug!(
            "얼굴 {}개 검출 ({}x{})",
            faces.len(),
            image.width(),
            image.height()
        );

        if faces.is_empty() && !keep_without_faces {
            return Ok(None);
        }

        let swapped = self
            .compositor
            .composite(&image, &faces, &self.overlays, self.upscale);
        let png = self.codec.encode(&swapped)?;
        Ok(Some(SwapResult {
            faces: faces.len(),
            png,
        }))
    }
}

/// 파일 공유 이벤트 파이프라인: `FileSharedHandler` 포트 구현
pub struct MediaPipeline {
    api: Arc<dyn MessagingApi>,
    swapper: Arc<FaceSwapper>,
    overlays: Arc<OverlayLibrary>,
    settings: PipelineSettings,
}

impl MediaPipeline {
    pub fn new(
        api: Arc<dyn MessagingApi>,
        detector: Arc<dyn FaceDetector>,
        codec: Arc<dyn ImageCodec>,
        overlays: Arc<OverlayLibrary>,
        compositor: Arc<Compositor>,
        settings: PipelineSettings,
    ) -> Self {
        let swapper = Arc::new(FaceSwapper::new(
            detector,
            codec,
            overlays.clone(),
            compositor,
            settings.upscale,
        ));
        Self {
            api,
            swapper,
            overlays,
            settings,
        }
    }
}

#[async_trait]
impl FileSharedHandler for MediaPipeline {
    async fn handle(
        &self,
        event: &FileSharedEvent,
        session: &SessionContext,
    ) -> Result<PipelineOutcome, CoreError> {
        if self.overlays.is_empty() {
            return Err(CoreError::Load("오버레이 라이브러리가 비어 있음".to_string()));
        }

        let info = self.api.file_info(&event.file_id).await?;
        if !info.mentions(&session.self_id, &self.settings.trigger_keyword) {
            debug!("[{}] 코멘트에 봇 언급 없음", info.id);
            return Ok(PipelineOutcome::NotEligible);
        }

        let bytes = self.api.download(&info.url_private).await?;
        debug!("[{}] 다운로드 {} bytes", info.id, bytes.len());

        let swapper = self.swapper.clone();
        let keep = self.settings.upload_without_faces;
        let swapped = tokio::task::spawn_blocking(move || swapper.swap(&bytes, keep))
            .await
            .map_err(|e| CoreError::Internal(format!("이미지 작업 조인 실패: {e}")))??;

        let Some(result) = swapped else {
            return Ok(PipelineOutcome::NoFaces);
        };

        let filename = info.swapped_filename();
        self.api
            .upload(&FileUpload {
                bytes: result.png,
                filename: filename.clone(),
                channel_ids: session.channel_ids.clone(),
            })
            .await?;

        Ok(PipelineOutcome::Uploaded {
            faces: result.faces,
            filename,
        })
    }
}
