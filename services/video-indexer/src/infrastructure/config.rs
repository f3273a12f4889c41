/// Video Indexer連携設定
///
/// Azure（Microsoft Entra ID / ARM / Video Indexer API）への接続情報と、
/// アップロード・字幕保存の動作設定を環境変数から読み込む。
use std::time::Duration;

use thiserror::Error;

use crate::domain::{CaptionFormat, VideoPrivacy};
use crate::infrastructure::ssm_ops::{AwsSsmOps, SecretOps};

/// Video Indexer APIのデフォルトエンドポイント
pub const DEFAULT_VIDEO_INDEXER_API_URL: &str = "https://api.videoindexer.ai";
/// Azure Resource ManagerのデフォルトエンドポイントURL
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";
/// Microsoft Entra IDのデフォルトログインエンドポイント
pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
/// 字幕のデフォルト言語
pub const DEFAULT_CAPTION_LANGUAGE: &str = "en-US";
/// 字幕保存先のデフォルトプレフィックス
pub const DEFAULT_CAPTIONS_PREFIX: &str = "captions/";
/// 署名付きURLのデフォルト有効期限（秒）
///
/// Video Indexerはアップロード受付後に非同期でダウンロードするため、長めに取る。
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 4 * 60 * 60;
/// 署名付きURLの最小有効期限（秒）
pub const MIN_PRESIGN_EXPIRY_SECS: u64 = 60;
/// 署名付きURLの最大有効期限（秒、S3 SigV4の上限7日）
pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

/// 設定読み込みのエラー型
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必須の環境変数が設定されていない
    #[error("必須の環境変数が設定されていません: {0}")]
    MissingEnvVar(String),

    /// 環境変数の値が不正
    #[error("環境変数の値が不正です: {name}={value}")]
    InvalidValue {
        /// 環境変数名
        name: String,
        /// 設定されていた値
        value: String,
    },

    /// SSMパラメータ指定のシークレットをSSMなしで読み込もうとした
    #[error("SSMパラメータで指定されたシークレットです（from_env_with_ssmを使用してください）: {0}")]
    SecretRequiresSsm(String),

    /// SSMからのシークレット取得に失敗
    #[error("シークレット取得に失敗しました: {0}")]
    SecretFetchFailed(String),
}

/// シークレットの取得元
#[derive(Debug, Clone, PartialEq, Eq)]
enum SecretSource {
    /// 環境変数に直接設定された値
    Inline(String),
    /// SSMパラメータ名
    SsmParameter(String),
}

/// Video Indexerアカウントを特定するARMリソース情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureAccountConfig {
    /// テナントID
    pub tenant_id: String,
    /// サービスプリンシパルのクライアントID
    pub client_id: String,
    /// サブスクリプションID
    pub subscription_id: String,
    /// リソースグループ名
    pub resource_group: String,
    /// Video Indexerアカウント名
    pub account_name: String,
    /// Microsoft Entra IDログインエンドポイント
    pub login_endpoint: String,
    /// ARMエンドポイント
    pub arm_endpoint: String,
}

impl AzureAccountConfig {
    /// Video IndexerアカウントのARMリソースパス
    ///
    /// 例: `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.VideoIndexer/accounts/{name}`
    pub fn resource_path(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.VideoIndexer/accounts/{}",
            self.subscription_id, self.resource_group, self.account_name
        )
    }
}

/// Video Indexer連携の全設定
#[derive(Clone)]
pub struct IndexerConfig {
    azure: AzureAccountConfig,
    client_secret: String,
    api_url: String,
    callback_url: String,
    callback_token: String,
    caption_language: String,
    caption_format: CaptionFormat,
    captions_prefix: String,
    captions_bucket: Option<String>,
    presign_expiry: Duration,
    privacy: VideoPrivacy,
}

// シークレットはログに出さない
impl std::fmt::Debug for IndexerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerConfig")
            .field("azure", &self.azure)
            .field("client_secret", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("callback_url", &self.callback_url)
            .field("callback_token", &"<redacted>")
            .field("caption_language", &self.caption_language)
            .field("caption_format", &self.caption_format)
            .field("captions_prefix", &self.captions_prefix)
            .field("captions_bucket", &self.captions_bucket)
            .field("presign_expiry", &self.presign_expiry)
            .field("privacy", &self.privacy)
            .finish()
    }
}

impl IndexerConfig {
    /// 明示的な値で設定を作成（テスト用）
    ///
    /// 省略可能な項目はデフォルト値になる。
    pub fn new(
        azure: AzureAccountConfig,
        client_secret: impl Into<String>,
        callback_url: impl Into<String>,
        callback_token: impl Into<String>,
    ) -> Self {
        Self {
            azure,
            client_secret: client_secret.into(),
            api_url: DEFAULT_VIDEO_INDEXER_API_URL.to_string(),
            callback_url: callback_url.into(),
            callback_token: callback_token.into(),
            caption_language: DEFAULT_CAPTION_LANGUAGE.to_string(),
            caption_format: CaptionFormat::default(),
            captions_prefix: DEFAULT_CAPTIONS_PREFIX.to_string(),
            captions_bucket: None,
            presign_expiry: Duration::from_secs(DEFAULT_PRESIGN_EXPIRY_SECS),
            privacy: VideoPrivacy::default(),
        }
    }

    /// Video Indexer APIのURLを上書き
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// 字幕保存先バケットを上書き
    pub fn with_captions_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.captions_bucket = Some(bucket.into());
        self
    }

    /// 環境変数から設定を読み込み（シークレットは環境変数に直接設定されている必要がある）
    ///
    /// # 環境変数
    /// - `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_SUBSCRIPTION_ID`,
    ///   `AZURE_RESOURCE_GROUP`, `VIDEO_INDEXER_ACCOUNT_NAME`, `CALLBACK_URL`（必須）
    /// - `AZURE_CLIENT_SECRET` または `AZURE_CLIENT_SECRET_PARAMETER`（必須）
    /// - `CALLBACK_TOKEN` または `CALLBACK_TOKEN_PARAMETER`（必須）
    /// - `VIDEO_INDEXER_API_URL`, `ARM_ENDPOINT`, `LOGIN_ENDPOINT`, `CAPTION_LANGUAGE`,
    ///   `CAPTION_FORMAT`, `CAPTIONS_PREFIX`, `CAPTIONS_BUCKET`, `PRESIGN_EXPIRY_SECS`,
    ///   `VIDEO_PRIVACY`（任意）
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_secret = match secret_source("AZURE_CLIENT_SECRET")? {
            SecretSource::Inline(value) => value,
            SecretSource::SsmParameter(_) => {
                return Err(ConfigError::SecretRequiresSsm(
                    "AZURE_CLIENT_SECRET_PARAMETER".to_string(),
                ));
            }
        };
        let callback_token = match secret_source("CALLBACK_TOKEN")? {
            SecretSource::Inline(value) => value,
            SecretSource::SsmParameter(_) => {
                return Err(ConfigError::SecretRequiresSsm(
                    "CALLBACK_TOKEN_PARAMETER".to_string(),
                ));
            }
        };

        Self::from_env_with_secrets(client_secret, callback_token)
    }

    /// 環境変数から設定を読み込み、SSMパラメータ指定のシークレットを解決する
    pub async fn from_env_with_ssm() -> Result<Self, ConfigError> {
        let ssm = AwsSsmOps::from_config().await;
        Self::from_env_with(&ssm).await
    }

    /// 指定したシークレット取得実装を使って設定を読み込む
    pub async fn from_env_with<S>(secrets: &S) -> Result<Self, ConfigError>
    where
        S: SecretOps + ?Sized,
    {
        let client_secret = resolve_secret(secrets, secret_source("AZURE_CLIENT_SECRET")?).await?;
        let callback_token = resolve_secret(secrets, secret_source("CALLBACK_TOKEN")?).await?;

        Self::from_env_with_secrets(client_secret, callback_token)
    }

    fn from_env_with_secrets(
        client_secret: String,
        callback_token: String,
    ) -> Result<Self, ConfigError> {
        let azure = AzureAccountConfig {
            tenant_id: required("AZURE_TENANT_ID")?,
            client_id: required("AZURE_CLIENT_ID")?,
            subscription_id: required("AZURE_SUBSCRIPTION_ID")?,
            resource_group: required("AZURE_RESOURCE_GROUP")?,
            account_name: required("VIDEO_INDEXER_ACCOUNT_NAME")?,
            login_endpoint: optional("LOGIN_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_LOGIN_ENDPOINT.to_string()),
            arm_endpoint: optional("ARM_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_ARM_ENDPOINT.to_string()),
        };

        let callback_url = required("CALLBACK_URL")?;
        if url::Url::parse(&callback_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "CALLBACK_URL".to_string(),
                value: callback_url,
            });
        }

        let caption_format = match optional("CAPTION_FORMAT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "CAPTION_FORMAT".to_string(),
                value,
            })?,
            None => CaptionFormat::default(),
        };

        let privacy = match optional("VIDEO_PRIVACY") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "VIDEO_PRIVACY".to_string(),
                value,
            })?,
            None => VideoPrivacy::default(),
        };

        let presign_expiry_secs = match optional("PRESIGN_EXPIRY_SECS") {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "PRESIGN_EXPIRY_SECS".to_string(),
                    value,
                })?
                .clamp(MIN_PRESIGN_EXPIRY_SECS, MAX_PRESIGN_EXPIRY_SECS),
            None => DEFAULT_PRESIGN_EXPIRY_SECS,
        };

        Ok(Self {
            azure,
            client_secret,
            api_url: optional("VIDEO_INDEXER_API_URL")
                .unwrap_or_else(|| DEFAULT_VIDEO_INDEXER_API_URL.to_string()),
            callback_url,
            callback_token,
            caption_language: optional("CAPTION_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_CAPTION_LANGUAGE.to_string()),
            caption_format,
            // 空文字を明示した場合はバケット直下に保存する
            captions_prefix: std::env::var("CAPTIONS_PREFIX")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|_| DEFAULT_CAPTIONS_PREFIX.to_string()),
            captions_bucket: optional("CAPTIONS_BUCKET"),
            presign_expiry: Duration::from_secs(presign_expiry_secs),
            privacy,
        })
    }

    pub fn azure(&self) -> &AzureAccountConfig {
        &self.azure
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn callback_token(&self) -> &str {
        &self.callback_token
    }

    pub fn caption_language(&self) -> &str {
        &self.caption_language
    }

    pub fn caption_format(&self) -> CaptionFormat {
        self.caption_format
    }

    pub fn captions_prefix(&self) -> &str {
        &self.captions_prefix
    }

    /// 字幕保存先バケット（未設定時は元ビデオと同じバケット）
    pub fn captions_bucket(&self) -> Option<&str> {
        self.captions_bucket.as_deref()
    }

    pub fn presign_expiry(&self) -> Duration {
        self.presign_expiry
    }

    pub fn privacy(&self) -> VideoPrivacy {
        self.privacy
    }
}

/// 必須の環境変数を読み込む（空文字は未設定扱い）
fn required(name: &str) -> Result<String, ConfigError> {
    optional(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// 任意の環境変数を読み込む（空文字は未設定扱い）
fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `{name}`または`{name}_PARAMETER`からシークレットの取得元を決定する
///
/// 両方設定されている場合は直接指定の値を優先する。
fn secret_source(name: &str) -> Result<SecretSource, ConfigError> {
    if let Some(value) = optional(name) {
        return Ok(SecretSource::Inline(value));
    }
    let parameter_var = format!("{}_PARAMETER", name);
    optional(&parameter_var)
        .map(SecretSource::SsmParameter)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

async fn resolve_secret<S>(secrets: &S, source: SecretSource) -> Result<String, ConfigError>
where
    S: SecretOps + ?Sized,
{
    match source {
        SecretSource::Inline(value) => Ok(value),
        SecretSource::SsmParameter(parameter) => secrets
            .get_secure_parameter(&parameter)
            .await
            .map_err(|e| ConfigError::SecretFetchFailed(e.to_string())),
    }
}
