// CallbackHandler - Video Indexerのインデックス完了コールバック処理
//
// Lambda Function URL経由でVideo Indexerからのコールバックを受け取り、
// 処理が完了していれば字幕を取得してS3に保存する。

use lambda_http::http::header::CONTENT_TYPE;
use lambda_http::http::{Method, StatusCode};
use lambda_http::{Body, Request, Response};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{error, info, warn};

use super::indexer_session::IndexerSession;
use crate::domain::callback_params::PARAM_TOKEN;
use crate::domain::{CallbackParams, CallbackParamsError, CaptionFormat, IndexingState};
use crate::infrastructure::{
    AccessPermission, AccountOps, AzureAuthError, IndexerConfig, StorageError, VideoIndexerApi,
    VideoIndexerError, VideoStorage,
};

/// コールバック処理のエラー型
#[derive(Debug, Error)]
pub enum CallbackError {
    /// 許可されていないHTTPメソッド
    #[error("許可されていないメソッドです: {0}")]
    MethodNotAllowed(String),

    /// 検証トークンが一致しない
    #[error("コールバックトークンが不正です")]
    Unauthorized,

    /// クエリパラメータが不正
    #[error("不正なコールバックパラメータ: {0}")]
    InvalidParams(#[from] CallbackParamsError),

    /// 字幕の保存先バケットが決められない
    #[error("字幕の保存先バケットが不明です")]
    MissingDestination,

    /// Azure認証エラー
    #[error("Azure認証エラー: {0}")]
    Auth(#[from] AzureAuthError),

    /// Video Indexer APIエラー
    #[error("Video Indexer APIエラー: {0}")]
    Indexer(#[from] VideoIndexerError),

    /// S3操作エラー
    #[error("S3操作エラー: {0}")]
    Storage(#[from] StorageError),
}

impl CallbackError {
    /// HTTPステータスコード
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidParams(_) | Self::MissingDestination => StatusCode::BAD_REQUEST,
            Self::Auth(_) | Self::Indexer(_) | Self::Storage(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// エラー種別（レスポンスの`error`フィールド）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::Unauthorized => "unauthorized",
            Self::InvalidParams(_) => "bad_request",
            Self::MissingDestination => "missing_destination",
            Self::Auth(_) | Self::Indexer(_) | Self::Storage(_) => "upstream_error",
        }
    }
}

/// エラーレスポンスのボディ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// エラー種別
    pub error: String,
    /// 詳細なエラーメッセージ
    pub message: String,
}

/// コールバック処理の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// 字幕を取得して保存した
    CaptionsStored {
        video_id: String,
        bucket: String,
        key: String,
    },
    /// インデックスが失敗で終了した（取得するものはない）
    IndexingFailed {
        video_id: String,
        state: IndexingState,
    },
    /// 途中経過の通知を受け付けた
    Acknowledged {
        video_id: String,
        state: IndexingState,
    },
}

/// 成功レスポンスのボディ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResponseBody {
    pub video_id: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captions_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captions_key: Option<String>,
}

impl From<&CallbackOutcome> for CallbackResponseBody {
    fn from(outcome: &CallbackOutcome) -> Self {
        match outcome {
            CallbackOutcome::CaptionsStored {
                video_id,
                bucket,
                key,
            } => Self {
                video_id: video_id.clone(),
                state: IndexingState::Processed.to_string(),
                captions_bucket: Some(bucket.clone()),
                captions_key: Some(key.clone()),
            },
            CallbackOutcome::IndexingFailed { video_id, state }
            | CallbackOutcome::Acknowledged { video_id, state } => Self {
                video_id: video_id.clone(),
                state: state.to_string(),
                captions_bucket: None,
                captions_key: None,
            },
        }
    }
}

/// コールバック処理の設定
#[derive(Debug, Clone)]
pub struct CallbackSettings {
    /// コールバック検証トークン
    pub callback_token: String,
    /// 字幕保存先プレフィックス
    pub captions_prefix: String,
    /// 字幕保存先バケット（未設定時は元ビデオのバケット）
    pub captions_bucket: Option<String>,
    /// 字幕形式
    pub caption_format: CaptionFormat,
    /// 字幕言語
    pub caption_language: String,
}

impl From<&IndexerConfig> for CallbackSettings {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            callback_token: config.callback_token().to_string(),
            captions_prefix: config.captions_prefix().to_string(),
            captions_bucket: config.captions_bucket().map(str::to_string),
            caption_format: config.caption_format(),
            caption_language: config.caption_language().to_string(),
        }
    }
}

/// Video Indexerコールバックを処理するハンドラー
pub struct CallbackHandler<A, V, S>
where
    A: AccountOps,
    V: VideoIndexerApi,
    S: VideoStorage,
{
    account_ops: A,
    indexer: V,
    storage: S,
    settings: CallbackSettings,
}

impl<A, V, S> CallbackHandler<A, V, S>
where
    A: AccountOps,
    V: VideoIndexerApi,
    S: VideoStorage,
{
    /// 新しいCallbackHandlerを作成
    pub fn new(account_ops: A, indexer: V, storage: S, settings: CallbackSettings) -> Self {
        Self {
            account_ops,
            indexer,
            storage,
            settings,
        }
    }

    /// HTTPリクエストを処理してレスポンスを生成
    pub async fn handle(&self, request: &Request) -> Result<Response<Body>, lambda_http::http::Error> {
        let query = request.uri().query().unwrap_or_default();
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        match self.process(request.method(), &pairs).await {
            Ok(outcome) => json_response(StatusCode::OK, &CallbackResponseBody::from(&outcome)),
            Err(err) => {
                let status = err.status();
                if status.is_server_error() {
                    error!(error = %err, status = %status, "コールバック処理に失敗");
                } else {
                    warn!(error = %err, status = %status, "コールバックを拒否");
                }
                json_response(
                    status,
                    &ErrorBody {
                        error: err.kind().to_string(),
                        message: err.to_string(),
                    },
                )
            }
        }
    }

    /// メソッドとクエリパラメータからコールバックを処理
    pub async fn process(
        &self,
        method: &Method,
        pairs: &[(String, String)],
    ) -> Result<CallbackOutcome, CallbackError> {
        if *method != Method::POST && *method != Method::GET {
            return Err(CallbackError::MethodNotAllowed(method.to_string()));
        }

        let params =
            CallbackParams::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        // パラメータ不備より先にトークンを検証し、未認証の呼び出し元に詳細を返さない
        let token = pairs
            .iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(PARAM_TOKEN) && !v.is_empty())
            .map(|(_, v)| v.as_str());
        if !tokens_match(&self.settings.callback_token, token) {
            return Err(CallbackError::Unauthorized);
        }

        let params = params?;

        info!(
            video_id = %params.video_id,
            state = %params.state,
            source_key = params.source_key.as_deref().unwrap_or("-"),
            "コールバック受信"
        );

        match &params.state {
            IndexingState::Processed => self.store_captions(&params).await,
            state if state.is_failure() => {
                error!(
                    video_id = %params.video_id,
                    state = %state,
                    source_key = params.source_key.as_deref().unwrap_or("-"),
                    "ビデオのインデックス処理が失敗"
                );
                Ok(CallbackOutcome::IndexingFailed {
                    video_id: params.video_id.clone(),
                    state: state.clone(),
                })
            }
            state => Ok(CallbackOutcome::Acknowledged {
                video_id: params.video_id.clone(),
                state: state.clone(),
            }),
        }
    }

    /// 字幕を取得してS3に保存
    async fn store_captions(&self, params: &CallbackParams) -> Result<CallbackOutcome, CallbackError> {
        let bucket = self
            .settings
            .captions_bucket
            .clone()
            .or_else(|| params.source_bucket.clone())
            .ok_or(CallbackError::MissingDestination)?;
        let format = self.settings.caption_format;
        let key = params.captions_key(&self.settings.captions_prefix, format);

        let session = IndexerSession::open(&self.account_ops, AccessPermission::Reader).await?;

        let captions = self
            .indexer
            .get_captions(
                &session.account,
                &session.access_token,
                &params.video_id,
                format,
                &self.settings.caption_language,
            )
            .await?;

        self.storage
            .put_captions(&bucket, &key, captions, format.content_type())
            .await?;

        info!(
            video_id = %params.video_id,
            bucket = %bucket,
            key = %key,
            "字幕を保存"
        );

        Ok(CallbackOutcome::CaptionsStored {
            video_id: params.video_id.clone(),
            bucket,
            key,
        })
    }
}

/// 検証トークンを定数時間で比較する
fn tokens_match(expected: &str, actual: Option<&str>) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    if expected.is_empty() || expected.len() != actual.len() {
        return false;
    }
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}

/// JSONレスポンスを構築
fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response<Body>, lambda_http::http::Error> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::Text(json))
}
