//! Web API 클라이언트.
//!
//! `MessagingApi` 포트 구현. Bearer 토큰 인증, `{ok, error}` 응답 봉투 검사,
//! 조회성 호출의 네트워크 에러 재시도를 담당한다.

use async_trait::async_trait;
use faceswap_core::error::CoreError;
use faceswap_core::models::file::{Channel, FileInfo, FileUpload};
use faceswap_core::models::session::RealtimeHandshake;
use faceswap_core::ports::messaging::MessagingApi;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// 기본 재시도 횟수
const DEFAULT_MAX_RETRIES: u32 = 2;

/// `conversations.list` 페이지 크기
const CHANNEL_PAGE_LIMIT: &str = "200";

/// 재시도 가능한 에러인지 판별
fn is_retryable(error: &CoreError) -> bool {
    matches!(error, CoreError::Network(_))
}

// ============================================================
// 응답 모델
// ============================================================

#[derive(Debug, Deserialize)]
struct SelfIdentity {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    url: String,
    #[serde(rename = "self")]
    identity: SelfIdentity,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct FileInfoResponse {
    file: FileInfo,
}

/// `ok`/`error` 봉투 검사 후 본문 역직렬화
fn parse_envelope<T: DeserializeOwned>(method: &str, body: &str) -> Result<T, CoreError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| CoreError::Internal(format!("{method} 응답 파싱 실패: {e}")))?;

    let ok = value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
    if !ok {
        let error = value
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown_error")
            .to_string();
        return Err(CoreError::Api {
            method: method.to_string(),
            error,
        });
    }

    serde_json::from_value(value)
        .map_err(|e| CoreError::Internal(format!("{method} 응답 형식 오류: {e}")))
}

/// Web API 클라이언트: `MessagingApi` 포트 구현
pub struct SlackWebClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    max_retries: u32,
}

impl SlackWebClient {
    /// 새 Web API 클라이언트 생성
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Authorization 헤더가 포함된 요청 빌더 반환
    fn authorized_request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.token)
    }

    fn method_url(&self, api_method: &str) -> String {
        format!("{}/{}", self.base_url, api_method)
    }

    /// 응답 상태 코드 확인 및 에러 매핑
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, CoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_else(|e| {
            warn!("응답 본문 읽기 실패: {e}");
            String::new()
        });

        match status.as_u16() {
            401 | 403 => Err(CoreError::Auth(format!("인증 실패 ({status}): {text}"))),
            429 | 500..=599 => Err(CoreError::Network(format!("서버 응답 {status}: {text}"))),
            _ => Err(CoreError::Internal(format!("API 에러 ({status}): {text}"))),
        }
    }

    /// GET 호출 후 봉투 검사
    async fn get_method<T: DeserializeOwned>(
        &self,
        api_method: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<T, CoreError> {
        let resp = self
            .authorized_request(reqwest::Method::GET, &self.method_url(api_method))
            .query(&query)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("{api_method} 요청 실패: {e}")))?;

        let resp = Self::check_response(resp).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| CoreError::Network(format!("{api_method} 응답 수신 실패: {e}")))?;
        parse_envelope(api_method, &body)
    }

    /// 재시도가 포함된 요청 실행
    ///
    /// exponential backoff: 1s → 2s → 4s
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if is_retryable(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "요청 실패 (시도 {}/{}): {e}, {delay:?} 후 재시도",
                        attempt,
                        self.max_retries + 1
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl MessagingApi for SlackWebClient {
    async fn connect_realtime(&self) -> Result<RealtimeHandshake, CoreError> {
        debug!("rtm.connect 요청");

        let resp: RtmConnectResponse = self
            .execute_with_retry(|| self.get_method("rtm.connect", Vec::new()))
            .await
            .map_err(|e| CoreError::Connect(e.to_string()))?;

        debug!(
            "rtm.connect 성공: self={} ({})",
            resp.identity.id, resp.identity.name
        );
        Ok(RealtimeHandshake {
            url: resp.url,
            self_id: resp.identity.id,
            self_name: resp.identity.name,
        })
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, CoreError> {
        let mut channels = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut query = vec![
                ("limit", CHANNEL_PAGE_LIMIT.to_string()),
                ("exclude_archived", "true".to_string()),
            ];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.clone()));
            }

            let page: ChannelListResponse = self
                .execute_with_retry(|| self.get_method("conversations.list", query.clone()))
                .await
                .map_err(|e| CoreError::Connect(format!("채널 목록 조회 실패: {e}")))?;

            channels.extend(page.channels);
            cursor = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                break;
            }
        }

        debug!("채널 {}개 조회", channels.len());
        Ok(channels)
    }

    async fn file_info(&self, file_id: &str) -> Result<FileInfo, CoreError> {
        debug!("files.info 요청: {file_id}");

        let query = vec![("file", file_id.to_string())];
        let resp: FileInfoResponse = self
            .execute_with_retry(|| self.get_method("files.info", query.clone()))
            .await
            .map_err(|e| CoreError::Metadata(format!("{file_id}: {e}")))?;

        Ok(resp.file)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, CoreError> {
        debug!("다운로드: {url}");

        let bytes = self
            .execute_with_retry(|| async {
                let resp = self
                    .authorized_request(reqwest::Method::GET, url)
                    .send()
                    .await
                    .map_err(|e| CoreError::Network(format!("다운로드 요청 실패: {e}")))?;
                let resp = Self::check_response(resp).await?;
                resp.bytes()
                    .await
                    .map_err(|e| CoreError::Network(format!("다운로드 본문 수신 실패: {e}")))
            })
            .await
            .map_err(|e| CoreError::Download(format!("{url}: {e}")))?;

        debug!("다운로드 완료: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn upload(&self, upload: &FileUpload) -> Result<(), CoreError> {
        debug!(
            "업로드: {} ({} bytes) → {:?}",
            upload.filename,
            upload.bytes.len(),
            upload.channel_ids
        );

        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.filename.clone())
            .mime_str("image/png")
            .map_err(|e| CoreError::Upload(format!("multipart 구성 실패: {e}")))?;
        let form = Form::new()
            .part("file", part)
            .text("filename", upload.filename.clone())
            .text("channels", upload.channel_ids.join(","));

        // 업로드는 재시도하지 않음
        let resp = self
            .authorized_request(reqwest::Method::POST, &self.method_url("files.upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CoreError::Upload(format!("{}: 요청 실패: {e}", upload.filename)))?;

        let result: Result<serde_json::Value, CoreError> = async {
            let resp = Self::check_response(resp).await?;
            let body = resp
                .text()
                .await
                .map_err(|e| CoreError::Network(format!("응답 수신 실패: {e}")))?;
            parse_envelope("files.upload", &body)
        }
        .await;

        result
            .map(|_| ())
            .map_err(|e| CoreError::Upload(format!("{}: {e}", upload.filename)))
    }
}
