// Video Indexer APIクライアント
//
// アカウントアクセストークンを使って以下のAPIを呼び出す:
// - POST /{location}/Accounts/{accountId}/Videos: URL指定でビデオをアップロードしインデックス開始
// - GET  /{location}/Accounts/{accountId}/Videos/{videoId}/Captions: 字幕を取得

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use url::Url;

use super::azure_auth::AccountInfo;
use crate::domain::{CaptionFormat, IndexingState, VideoPrivacy};

/// 最大再試行回数
const MAX_RETRIES: u32 = 3;

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Video Indexer API呼び出しのエラー型
#[derive(Debug, Error)]
pub enum VideoIndexerError {
    /// HTTPエラー（ステータスコード付き）
    #[error("HTTPエラー: status={status}, message={message}")]
    HttpError {
        /// HTTPステータスコード
        status: u16,
        /// エラーメッセージ
        message: String,
    },

    /// ネットワークエラー
    #[error("ネットワークエラー: {0}")]
    NetworkError(String),

    /// URL構築エラー
    #[error("URL構築エラー: {0}")]
    InvalidUrl(String),

    /// レスポンスの形式が不正
    #[error("不正なレスポンス: {0}")]
    InvalidResponse(String),

    /// 再試行回数超過エラー
    #[error("再試行回数超過: {0}")]
    RetryExhausted(String),
}

impl VideoIndexerError {
    /// 同一ビデオが既にインデックス中（409 Conflict）かどうか
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::HttpError { status: 409, .. })
    }
}

/// ビデオアップロード要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// ビデオ名
    pub name: String,
    /// Video Indexerがダウンロードする署名付きURL
    pub video_url: String,
    /// インデックス完了時に呼び出されるURL
    pub callback_url: String,
    /// 外部ID（元オブジェクトの`bucket/key`）
    pub external_id: String,
    /// 公開範囲
    pub privacy: VideoPrivacy,
    /// ソース言語
    pub language: String,
}

/// アップロード結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedVideo {
    /// Video IndexerのビデオID
    pub id: String,
    /// アップロード直後の処理状態
    pub state: IndexingState,
}

/// アップロードAPIのレスポンス（必要なフィールドのみ）
#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
    #[serde(default)]
    state: Option<String>,
}

/// Video Indexer API操作トレイト（テスト用の抽象化）
#[async_trait]
pub trait VideoIndexerApi: Send + Sync {
    /// URL指定でビデオをアップロードし、インデックス処理を開始する
    async fn upload_video(
        &self,
        account: &AccountInfo,
        access_token: &str,
        request: &UploadRequest,
    ) -> Result<UploadedVideo, VideoIndexerError>;

    /// インデックス済みビデオの字幕を取得する
    async fn get_captions(
        &self,
        account: &AccountInfo,
        access_token: &str,
        video_id: &str,
        format: CaptionFormat,
        language: &str,
    ) -> Result<String, VideoIndexerError>;
}

/// Video Indexer APIクライアント
#[derive(Clone)]
pub struct VideoIndexerClient {
    /// HTTPクライアント（再試行ミドルウェア付き、冪等なGET用）
    client: ClientWithMiddleware,
    /// アップロード用HTTPクライアント（再試行なし）
    ///
    /// 5xx後の再送でインデックスジョブが重複しないよう、POSTは再試行しない。
    /// 失敗時はLambdaイベントの再試行に任せる。
    upload_client: ClientWithMiddleware,
    /// APIベースURL
    api_url: String,
}

impl std::fmt::Debug for VideoIndexerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoIndexerClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl VideoIndexerClient {
    /// APIベースURLからクライアントを作成
    pub fn new(api_url: impl Into<String>) -> Result<Self, VideoIndexerError> {
        let api_url = api_url.into();
        info!(api_url = %api_url, "VideoIndexerClientを初期化");

        let base_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| VideoIndexerError::NetworkError(e.to_string()))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);

        let client = ClientBuilder::new(base_client.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        let upload_client = ClientBuilder::new(base_client).build();

        Ok(Self {
            client,
            upload_client,
            api_url,
        })
    }

    /// アカウント配下のビデオコレクションURL
    fn videos_url(&self, account: &AccountInfo) -> Result<Url, VideoIndexerError> {
        let raw = format!(
            "{}/{}/Accounts/{}/Videos",
            self.api_url.trim_end_matches('/'),
            account.location,
            account.account_id
        );
        Url::parse(&raw).map_err(|e| VideoIndexerError::InvalidUrl(e.to_string()))
    }

    /// アップロードURL（クエリパラメータ付き）
    fn upload_url(
        &self,
        account: &AccountInfo,
        request: &UploadRequest,
    ) -> Result<Url, VideoIndexerError> {
        let mut url = self.videos_url(account)?;
        url.query_pairs_mut()
            .append_pair("name", &request.name)
            .append_pair("privacy", request.privacy.api_value())
            .append_pair("videoUrl", &request.video_url)
            .append_pair("callbackUrl", &request.callback_url)
            .append_pair("externalId", &request.external_id)
            .append_pair("language", &request.language);
        Ok(url)
    }

    /// 字幕取得URL（クエリパラメータ付き）
    fn captions_url(
        &self,
        account: &AccountInfo,
        video_id: &str,
        format: CaptionFormat,
        language: &str,
    ) -> Result<Url, VideoIndexerError> {
        let mut url = self.videos_url(account)?;
        url.path_segments_mut()
            .map_err(|_| VideoIndexerError::InvalidUrl(self.api_url.clone()))?
            .push(video_id)
            .push("Captions");
        url.query_pairs_mut()
            .append_pair("format", format.api_value())
            .append_pair("language", language);
        Ok(url)
    }
}

#[async_trait]
impl VideoIndexerApi for VideoIndexerClient {
    #[instrument(skip(self, access_token, request), fields(name = %request.name, location = %account.location))]
    async fn upload_video(
        &self,
        account: &AccountInfo,
        access_token: &str,
        request: &UploadRequest,
    ) -> Result<UploadedVideo, VideoIndexerError> {
        let url = self.upload_url(account, request)?;
        debug!(external_id = %request.external_id, "ビデオをアップロード");

        let response = self
            .upload_client
            .post(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "ビデオアップロードエラー");
            return Err(VideoIndexerError::HttpError {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: UploadResponse = response.json().await.map_err(|e| {
            error!(error = %e, "アップロードレスポンスの解析に失敗");
            VideoIndexerError::InvalidResponse(e.to_string())
        })?;

        let uploaded = UploadedVideo {
            id: body.id,
            state: body
                .state
                .as_deref()
                .map(IndexingState::parse)
                .unwrap_or(IndexingState::Uploaded),
        };

        info!(video_id = %uploaded.id, state = %uploaded.state, "ビデオのアップロードに成功");
        Ok(uploaded)
    }

    #[instrument(skip(self, access_token), fields(location = %account.location))]
    async fn get_captions(
        &self,
        account: &AccountInfo,
        access_token: &str,
        video_id: &str,
        format: CaptionFormat,
        language: &str,
    ) -> Result<String, VideoIndexerError> {
        let url = self.captions_url(account, video_id, format, language)?;

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VideoIndexerError::InvalidResponse(e.to_string()))?;

        if !status.is_success() {
            error!(status = %status, body = %body, video_id = %video_id, "字幕取得エラー");
            return Err(VideoIndexerError::HttpError {
                status: status.as_u16(),
                message: body,
            });
        }

        // JSON文字列でラップされて返る場合があるため、その場合は中身を取り出す
        let captions = unwrap_json_string(body);

        info!(video_id = %video_id, bytes = captions.len(), "字幕の取得に成功");
        Ok(captions)
    }
}

/// `"WEBVTT\n..."`のようにJSON文字列として返された本文をデコードする
fn unwrap_json_string(body: String) -> String {
    if body.starts_with('"') {
        if let Ok(decoded) = serde_json::from_str::<String>(&body) {
            return decoded;
        }
    }
    body
}

fn map_send_error(err: reqwest_middleware::Error) -> VideoIndexerError {
    error!(error = %err, "Video Indexerへのリクエスト失敗");
    match &err {
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() || e.is_connect() => {
            VideoIndexerError::NetworkError(err.to_string())
        }
        _ => VideoIndexerError::RetryExhausted(err.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    /// テスト用のモックVideo Indexer API
    #[derive(Default)]
    pub struct MockVideoIndexerApi {
        pub uploads: Mutex<Vec<UploadRequest>>,
        pub caption_requests: Mutex<Vec<(String, CaptionFormat, String)>>,
        pub captions: String,
        pub fail_upload_status: Option<u16>,
        pub fail_captions_status: Option<u16>,
    }

    impl MockVideoIndexerApi {
        pub fn with_captions(captions: &str) -> Self {
            Self {
                captions: captions.to_string(),
                ..Self::default()
            }
        }

        pub fn upload_count(&self) -> usize {
            self.uploads.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VideoIndexerApi for MockVideoIndexerApi {
        async fn upload_video(
            &self,
            _account: &AccountInfo,
            _access_token: &str,
            request: &UploadRequest,
        ) -> Result<UploadedVideo, VideoIndexerError> {
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(request.clone());
            if let Some(status) = self.fail_upload_status {
                return Err(VideoIndexerError::HttpError {
                    status,
                    message: "upload failed".to_string(),
                });
            }
            Ok(UploadedVideo {
                id: format!("video-{}", uploads.len()),
                state: IndexingState::Uploaded,
            })
        }

        async fn get_captions(
            &self,
            _account: &AccountInfo,
            _access_token: &str,
            video_id: &str,
            format: CaptionFormat,
            language: &str,
        ) -> Result<String, VideoIndexerError> {
            self.caption_requests.lock().unwrap().push((
                video_id.to_string(),
                format,
                language.to_string(),
            ));
            if let Some(status) = self.fail_captions_status {
                return Err(VideoIndexerError::HttpError {
                    status,
                    message: "captions failed".to_string(),
                });
            }
            Ok(self.captions.clone())
        }
    }
}
