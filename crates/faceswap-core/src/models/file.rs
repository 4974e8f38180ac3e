//! 파일 메타데이터 / 업로드 / 채널 모델.
//!
//! Web API 응답 중 봇이 사용하는 필드만 정의한다.

use serde::{Deserialize, Serialize};

/// 첫 코멘트
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialComment {
    #[serde(default)]
    pub comment: String,
}

/// 파일 메타데이터 (`files.info` 응답의 `file`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// 파일 ID
    pub id: String,
    /// 비공개 다운로드 URL (Bearer 인증 필요)
    pub url_private: String,
    /// 파일 타입 / 확장자 (예: "png", "jpg")
    pub filetype: String,
    /// 업로드 시 함께 작성한 코멘트
    #[serde(default)]
    pub initial_comment: Option<InitialComment>,
}

impl FileInfo {
    /// 코멘트 텍스트 (없으면 빈 문자열)
    pub fn comment_text(&self) -> &str {
        self.initial_comment
            .as_ref()
            .map(|c| c.comment.as_str())
            .unwrap_or("")
    }

    /// 코멘트가 봇 자신 또는 트리거 키워드를 언급하는지
    pub fn mentions(&self, self_id: &str, trigger_keyword: &str) -> bool {
        let comment = self.comment_text();
        if comment.is_empty() {
            return false;
        }
        (!self_id.is_empty() && comment.contains(self_id))
            || (!trigger_keyword.is_empty() && comment.contains(trigger_keyword))
    }

    /// 재업로드 파일 이름: `<id>_swapped.<filetype>`
    pub fn swapped_filename(&self) -> String {
        format!("{}_swapped.{}", self.id, self.filetype)
    }
}

/// 채널
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// 업로드 요청
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// 인코딩된 이미지 바이트
    pub bytes: Vec<u8>,
    /// 파일 이름
    pub filename: String,
    /// 업로드 대상 채널 ID 목록
    pub channel_ids: Vec<String>,
}
