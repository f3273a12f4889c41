// UploadHandler - S3 ObjectCreatedイベントからVideo Indexerへのアップロード処理
//
// S3イベントの各レコードについて、ビデオファイルであれば署名付きURLを発行し、
// コールバックURLとともにVideo Indexerへアップロードを依頼する。
// インデックス処理は非同期で進み、完了はCallbackHandlerが受け取る。

use std::time::Duration;

use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use super::indexer_session::IndexerSession;
use crate::domain::{VideoObject, VideoPrivacy};
use crate::infrastructure::{
    build_callback_url, AccessPermission, AccountOps, AzureAuthError, IndexerConfig,
    StorageError, UploadRequest, UploadedVideo, VideoIndexerApi, VideoIndexerError, VideoStorage,
};

/// アップロード処理のエラー型
#[derive(Debug, Error)]
pub enum UploadError {
    /// S3イベントレコードの内容が不正
    #[error("不正なS3イベントレコード: {0}")]
    InvalidRecord(String),

    /// コールバックURLの構築に失敗
    #[error("コールバックURLの構築に失敗: {0}")]
    InvalidCallbackUrl(String),

    /// Azure認証エラー
    #[error("Azure認証エラー: {0}")]
    Auth(#[from] AzureAuthError),

    /// S3操作エラー
    #[error("S3操作エラー: {0}")]
    Storage(#[from] StorageError),

    /// Video Indexer APIエラー
    #[error("Video Indexer APIエラー: {0}")]
    Indexer(#[from] VideoIndexerError),
}

/// アップロード処理の設定
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// コールバック受信URL
    pub callback_url: String,
    /// コールバック検証トークン
    pub callback_token: String,
    /// 字幕保存先プレフィックス（この配下のオブジェクトは処理しない）
    pub captions_prefix: String,
    /// 署名付きURLの有効期限
    pub presign_expiry: Duration,
    /// ビデオの公開範囲
    pub privacy: VideoPrivacy,
    /// ソース言語
    pub language: String,
}

impl From<&IndexerConfig> for UploadSettings {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            callback_url: config.callback_url().to_string(),
            callback_token: config.callback_token().to_string(),
            captions_prefix: config.captions_prefix().to_string(),
            presign_expiry: config.presign_expiry(),
            privacy: config.privacy(),
            language: config.caption_language().to_string(),
        }
    }
}

/// レコード単位の処理アクション
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadAction {
    /// Video Indexerに登録した（デコード済みオブジェクトキーとともに）
    Submitted { key: String, video: UploadedVideo },
    /// スキップした（理由を含む）
    Skipped(String),
}

/// アップロード処理の結果
#[derive(Debug, Clone, Default)]
pub struct UploadResult {
    /// 登録に成功したレコード数
    pub success_count: usize,
    /// 処理に失敗したレコード数
    pub failure_count: usize,
    /// スキップしたレコード数
    pub skip_count: usize,
    /// 登録したビデオID（オブジェクトキー, ビデオID）
    pub submitted: Vec<(String, String)>,
}

/// S3イベントを処理してVideo Indexerへ登録するハンドラー
pub struct UploadHandler<A, V, S>
where
    A: AccountOps,
    V: VideoIndexerApi,
    S: VideoStorage,
{
    account_ops: A,
    indexer: V,
    storage: S,
    settings: UploadSettings,
}

impl<A, V, S> UploadHandler<A, V, S>
where
    A: AccountOps,
    V: VideoIndexerApi,
    S: VideoStorage,
{
    /// 新しいUploadHandlerを作成
    pub fn new(account_ops: A, indexer: V, storage: S, settings: UploadSettings) -> Self {
        Self {
            account_ops,
            indexer,
            storage,
            settings,
        }
    }

    /// S3イベントを処理
    ///
    /// アカウント情報とアクセストークンは、最初に登録が必要になったレコードで一度だけ取得する。
    /// 全レコードがスキップされた場合はAzureへのリクエストを行わない。
    pub async fn process_event(&self, event: &S3Event) -> UploadResult {
        info!(record_count = event.records.len(), "S3イベント処理開始");

        let session = OnceCell::new();
        let mut result = UploadResult::default();

        for record in &event.records {
            match self.process_record(record, &session).await {
                Ok(UploadAction::Submitted { key, video }) => {
                    result.success_count += 1;
                    result.submitted.push((key, video.id));
                }
                Ok(UploadAction::Skipped(reason)) => {
                    debug!(reason = %reason, "レコードをスキップ");
                    result.skip_count += 1;
                }
                Err(e) => {
                    error!(error = %e, "レコード処理に失敗");
                    result.failure_count += 1;
                }
            }
        }

        info!(
            success_count = result.success_count,
            failure_count = result.failure_count,
            skip_count = result.skip_count,
            "S3イベント処理完了"
        );

        result
    }

    /// 1レコードを処理
    async fn process_record(
        &self,
        record: &S3EventRecord,
        session: &OnceCell<IndexerSession>,
    ) -> Result<UploadAction, UploadError> {
        if let Some(event_name) = record.event_name.as_deref() {
            if !event_name.starts_with("ObjectCreated") {
                return Ok(UploadAction::Skipped(format!(
                    "対象外のイベント: {}",
                    event_name
                )));
            }
        }

        let bucket = record.s3.bucket.name.as_deref().unwrap_or_default();
        let key = record.s3.object.key.as_deref().unwrap_or_default();
        let size = record.s3.object.size.unwrap_or_default();

        let object = VideoObject::from_event_key(bucket, key, size)
            .map_err(|e| UploadError::InvalidRecord(e.to_string()))?;

        if let Some(reason) = self.skip_reason(&object) {
            return Ok(UploadAction::Skipped(reason));
        }

        let session = session
            .get_or_try_init(|| IndexerSession::open(&self.account_ops, AccessPermission::Contributor))
            .await?;

        match self.submit(&object, session).await {
            Ok(video) => Ok(UploadAction::Submitted {
                key: object.key().to_string(),
                video,
            }),
            // 同一ビデオのインデックスが進行中の場合、再試行しても結果は変わらない
            Err(UploadError::Indexer(e)) if e.is_conflict() => {
                warn!(
                    bucket = %object.bucket(),
                    key = %object.key(),
                    error = %e,
                    "ビデオは既にインデックス中"
                );
                Ok(UploadAction::Skipped("既にインデックス中".to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// 登録対象外の理由を返す（対象の場合はNone）
    fn skip_reason(&self, object: &VideoObject) -> Option<String> {
        if object.is_under_prefix(&self.settings.captions_prefix) {
            return Some(format!("字幕出力先のオブジェクト: {}", object.key()));
        }
        if !object.is_video() {
            return Some(format!("ビデオ以外のオブジェクト: {}", object.key()));
        }
        if object.is_empty() {
            return Some(format!("空のオブジェクト: {}", object.key()));
        }
        None
    }

    /// ビデオをVideo Indexerに登録する
    async fn submit(
        &self,
        object: &VideoObject,
        session: &IndexerSession,
    ) -> Result<UploadedVideo, UploadError> {
        info!(
            bucket = %object.bucket(),
            key = %object.key(),
            size = object.size(),
            "ビデオ登録開始"
        );

        let video_url = self
            .storage
            .presigned_get_url(object.bucket(), object.key(), self.settings.presign_expiry)
            .await?;

        let callback_url = build_callback_url(
            &self.settings.callback_url,
            object.bucket(),
            object.key(),
            &self.settings.callback_token,
        )
        .map_err(|e| UploadError::InvalidCallbackUrl(e.to_string()))?;

        let request = UploadRequest {
            name: object.video_name(),
            video_url,
            callback_url,
            external_id: format!("{}/{}", object.bucket(), object.key()),
            privacy: self.settings.privacy,
            language: self.settings.language.clone(),
        };

        let video = self
            .indexer
            .upload_video(&session.account, &session.access_token, &request)
            .await?;

        info!(
            key = %object.key(),
            video_id = %video.id,
            state = %video.state,
            "ビデオ登録完了"
        );

        Ok(video)
    }
}
