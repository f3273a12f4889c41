// Azure認証・ARMクライアント
//
// Microsoft Entra IDのクライアント資格情報フローでARM用トークンを取得し、
// Video IndexerアカウントのARMリソースに対して以下を行う:
// - generateAccessToken: Video Indexer API呼び出し用のアカウントアクセストークン発行
// - アカウント情報取得: Video Indexer APIのロケーションとアカウントIDの解決

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use super::config::AzureAccountConfig;

/// Video Indexer ARM APIのバージョン
pub const ARM_API_VERSION: &str = "2024-01-01";

/// 最大再試行回数
const MAX_RETRIES: u32 = 3;

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 有効期限のこの時間前にトークンを更新する（秒）
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Azure認証・ARM操作のエラー型
#[derive(Debug, Error)]
pub enum AzureAuthError {
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

    /// レスポンスの形式が不正
    #[error("不正なレスポンス: {0}")]
    InvalidResponse(String),

    /// 再試行回数超過エラー
    #[error("再試行回数超過: {0}")]
    RetryExhausted(String),
}

/// アカウントアクセストークンの権限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPermission {
    /// 読み取りのみ（字幕取得など）
    Reader,
    /// 書き込み可能（ビデオアップロードなど）
    Contributor,
}

impl AccessPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "Reader",
            Self::Contributor => "Contributor",
        }
    }
}

/// Video Indexer API呼び出しに必要なアカウント情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Video IndexerアカウントID（GUID）
    pub account_id: String,
    /// Video Indexer APIのロケーション（例: "eastus"）
    pub location: String,
}

/// 有効期限付きのベアラートークン
#[derive(Debug, Clone)]
pub struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// 指定時刻において、更新マージンを残して有効かどうか
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Video IndexerアカウントのARM操作トレイト（テスト用の抽象化）
#[async_trait]
pub trait AccountOps: Send + Sync {
    /// Video Indexer API用のアカウントアクセストークンを発行する
    async fn generate_access_token(
        &self,
        permission: AccessPermission,
    ) -> Result<String, AzureAuthError>;

    /// アカウントIDとロケーションを取得する
    async fn get_account(&self) -> Result<AccountInfo, AzureAuthError>;
}

/// Entra IDトークンエンドポイントのレスポンス
#[derive(Debug, Deserialize)]
struct EntraTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// generateAccessTokenのリクエストボディ
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenRequest<'a> {
    permission_type: &'a str,
    scope: &'a str,
}

/// generateAccessTokenのレスポンス
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
}

/// ARMアカウントリソースのレスポンス（必要なフィールドのみ）
#[derive(Debug, Deserialize)]
struct AccountResource {
    location: String,
    properties: AccountProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountProperties {
    account_id: String,
}

/// ARM APIクライアント
///
/// Entra IDトークンはLambdaのwarm start間で再利用するためキャッシュする。
pub struct ArmClient {
    client: ClientWithMiddleware,
    account: AzureAccountConfig,
    client_secret: String,
    token_cache: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmClient")
            .field("account_name", &self.account.account_name)
            .field("resource_group", &self.account.resource_group)
            .finish_non_exhaustive()
    }
}

impl ArmClient {
    /// 設定からArmClientを作成
    pub fn new(
        account: AzureAccountConfig,
        client_secret: impl Into<String>,
    ) -> Result<Self, AzureAuthError> {
        info!(
            account_name = %account.account_name,
            resource_group = %account.resource_group,
            "ArmClientを初期化"
        );

        let base_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AzureAuthError::NetworkError(e.to_string()))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);

        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            account,
            client_secret: client_secret.into(),
            token_cache: Mutex::new(None),
        })
    }

    /// Entra IDトークンエンドポイントURL
    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.account.login_endpoint.trim_end_matches('/'),
            self.account.tenant_id
        )
    }

    /// ARMトークンのスコープ
    fn arm_scope(&self) -> String {
        format!("{}/.default", self.account.arm_endpoint.trim_end_matches('/'))
    }

    /// アカウントリソースURL（api-version付き）
    fn account_url(&self) -> String {
        format!(
            "{}{}?api-version={}",
            self.account.arm_endpoint.trim_end_matches('/'),
            self.account.resource_path(),
            ARM_API_VERSION
        )
    }

    /// generateAccessToken URL（api-version付き）
    fn generate_access_token_url(&self) -> String {
        format!(
            "{}{}/generateAccessToken?api-version={}",
            self.account.arm_endpoint.trim_end_matches('/'),
            self.account.resource_path(),
            ARM_API_VERSION
        )
    }

    /// ARM用のEntra IDトークンを取得（キャッシュが有効ならそれを返す）
    async fn arm_token(&self) -> Result<String, AzureAuthError> {
        let mut cache = self.token_cache.lock().await;

        if let Some(token) = cache.as_ref().filter(|t| t.is_fresh_at(Utc::now())) {
            debug!(expires_at = %token.expires_at(), "キャッシュ済みARMトークンを使用");
            return Ok(token.token().to_string());
        }

        let token = self.request_arm_token().await?;
        let value = token.token().to_string();
        *cache = Some(token);
        Ok(value)
    }

    /// クライアント資格情報フローでARM用トークンを取得
    #[instrument(skip(self), fields(tenant_id = %self.account.tenant_id))]
    async fn request_arm_token(&self) -> Result<AccessToken, AzureAuthError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.account.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("scope", &self.arm_scope())
            .finish();

        let response = self
            .client
            .post(self.token_url())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(map_send_error)?;

        let response: EntraTokenResponse = parse_json(response, "Entra IDトークン取得").await?;

        info!(expires_in = response.expires_in, "ARMトークンを取得");

        Ok(AccessToken::new(
            response.access_token,
            Utc::now() + TimeDelta::seconds(response.expires_in),
        ))
    }
}

#[async_trait]
impl AccountOps for ArmClient {
    #[instrument(skip(self), fields(account_name = %self.account.account_name))]
    async fn generate_access_token(
        &self,
        permission: AccessPermission,
    ) -> Result<String, AzureAuthError> {
        let arm_token = self.arm_token().await?;

        let body = serde_json::to_string(&GenerateAccessTokenRequest {
            permission_type: permission.as_str(),
            scope: "Account",
        })
        .map_err(|e| AzureAuthError::InvalidResponse(e.to_string()))?;

        let response = self
            .client
            .post(self.generate_access_token_url())
            .header("Authorization", format!("Bearer {}", arm_token))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_send_error)?;

        let response: GenerateAccessTokenResponse =
            parse_json(response, "アカウントアクセストークン発行").await?;

        info!(permission = permission.as_str(), "アカウントアクセストークンを発行");
        Ok(response.access_token)
    }

    #[instrument(skip(self), fields(account_name = %self.account.account_name))]
    async fn get_account(&self) -> Result<AccountInfo, AzureAuthError> {
        let arm_token = self.arm_token().await?;

        let response = self
            .client
            .get(self.account_url())
            .header("Authorization", format!("Bearer {}", arm_token))
            .send()
            .await
            .map_err(map_send_error)?;

        let resource: AccountResource = parse_json(response, "アカウント情報取得").await?;
        let info = account_info_from_resource(resource)?;

        info!(
            account_id = %info.account_id,
            location = %info.location,
            "Video Indexerアカウント情報を取得"
        );
        Ok(info)
    }
}

/// ARMリソースのロケーション表記（"East US"など）をAPI用（"eastus"）に正規化する
fn account_info_from_resource(resource: AccountResource) -> Result<AccountInfo, AzureAuthError> {
    let location: String = resource
        .location
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    if location.is_empty() || resource.properties.account_id.trim().is_empty() {
        return Err(AzureAuthError::InvalidResponse(
            "アカウントIDまたはロケーションが空です".to_string(),
        ));
    }

    Ok(AccountInfo {
        account_id: resource.properties.account_id,
        location,
    })
}

/// 送信エラーを分類する
pub(crate) fn map_send_error(err: reqwest_middleware::Error) -> AzureAuthError {
    error!(error = %err, "Azureへのリクエスト失敗");
    match &err {
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() || e.is_connect() => {
            AzureAuthError::NetworkError(err.to_string())
        }
        _ => AzureAuthError::RetryExhausted(err.to_string()),
    }
}

/// 成功レスポンスをJSONとして解析し、失敗レスポンスはHttpErrorに変換する
async fn parse_json<T>(response: reqwest::Response, operation: &str) -> Result<T, AzureAuthError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, operation = %operation, "Azure APIエラー");
        return Err(AzureAuthError::HttpError {
            status: status.as_u16(),
            message: body,
        });
    }

    response.json::<T>().await.map_err(|e| {
        error!(error = %e, operation = %operation, "レスポンスの解析に失敗");
        AzureAuthError::InvalidResponse(e.to_string())
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::test_support::azure_account;
    use mockito::Matcher;

    fn client() -> ArmClient {
        ArmClient::new(azure_account(), "secret").unwrap()
    }

    // ==================== URL構築テスト ====================

    #[test]
    fn test_token_url() {
        assert_eq!(
            client().token_url(),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_arm_scope_trims_trailing_slash() {
        let mut account = azure_account();
        account.arm_endpoint = "https://management.azure.com/".to_string();
        let client = ArmClient::new(account, "secret").unwrap();
        assert_eq!(client.arm_scope(), "https://management.azure.com/.default");
    }

    #[test]
    fn test_account_urls() {
        let client = client();
        let base = "https://management.azure.com/subscriptions/sub-1/resourceGroups/rg-media/providers/Microsoft.VideoIndexer/accounts/vi-account";
        assert_eq!(
            client.account_url(),
            format!("{}?api-version={}", base, ARM_API_VERSION)
        );
        assert_eq!(
            client.generate_access_token_url(),
            format!("{}/generateAccessToken?api-version={}", base, ARM_API_VERSION)
        );
    }

    // ==================== トークン有効期限テスト ====================

    #[test]
    fn test_token_freshness_margin() {
        let now = Utc::now();
        let token = AccessToken::new("t", now + TimeDelta::seconds(TOKEN_REFRESH_MARGIN_SECS + 60));
        assert!(token.is_fresh_at(now));

        let expiring = AccessToken::new("t", now + TimeDelta::seconds(TOKEN_REFRESH_MARGIN_SECS - 1));
        assert!(!expiring.is_fresh_at(now));

        let expired = AccessToken::new("t", now - TimeDelta::seconds(1));
        assert!(!expired.is_fresh_at(now));
    }

    // ==================== レスポンス解析テスト ====================

    #[test]
    fn test_generate_access_token_request_body() {
        let body = serde_json::to_value(GenerateAccessTokenRequest {
            permission_type: AccessPermission::Contributor.as_str(),
            scope: "Account",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"permissionType": "Contributor", "scope": "Account"})
        );
    }

    #[test]
    fn test_account_info_from_resource() {
        let resource: AccountResource = serde_json::from_value(serde_json::json!({
            "id": "/subscriptions/sub-1/...",
            "name": "vi-account",
            "location": "East US",
            "properties": {"accountId": "1234-abcd", "tenantId": "tenant-1"}
        }))
        .unwrap();

        let info = account_info_from_resource(resource).unwrap();

        assert_eq!(info.account_id, "1234-abcd");
        assert_eq!(info.location, "eastus");
    }

    #[test]
    fn test_account_info_rejects_empty_account_id() {
        let resource: AccountResource = serde_json::from_value(serde_json::json!({
            "location": "westeurope",
            "properties": {"accountId": ""}
        }))
        .unwrap();

        assert!(matches!(
            account_info_from_resource(resource),
            Err(AzureAuthError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_entra_token_response_parse() {
        let response: EntraTokenResponse = serde_json::from_str(
            r#"{"token_type":"Bearer","expires_in":3599,"ext_expires_in":3599,"access_token":"eyJ0"}"#,
        )
        .unwrap();
        assert_eq!(response.access_token, "eyJ0");
        assert_eq!(response.expires_in, 3599);
    }

    // ==================== エラー表示テスト ====================

    #[test]
    fn test_error_display() {
        let error = AzureAuthError::HttpError {
            status: 403,
            message: "AuthorizationFailed".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("403"));
        assert!(display.contains("AuthorizationFailed"));

        let error = AzureAuthError::InvalidResponse("missing field".to_string());
        assert!(error.to_string().contains("missing field"));
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("vi-account"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_permission_values() {
        assert_eq!(AccessPermission::Reader.as_str(), "Reader");
        assert_eq!(AccessPermission::Contributor.as_str(), "Contributor");
    }

    // ==================== HTTP呼び出しテスト（モックサーバー） ====================

    const RESOURCE_PATH: &str = "/subscriptions/sub-1/resourceGroups/rg-media/providers/Microsoft.VideoIndexer/accounts/vi-account";

    fn mock_server_client(server: &mockito::ServerGuard) -> ArmClient {
        let mut account = azure_account();
        account.login_endpoint = server.url();
        account.arm_endpoint = server.url();
        ArmClient::new(account, "s3cret").unwrap()
    }

    async fn mock_entra_token(server: &mut mockito::ServerGuard, hits: usize) -> mockito::Mock {
        let scope = format!("{}/.default", server.url());
        server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
                Matcher::UrlEncoded("client_secret".into(), "s3cret".into()),
                Matcher::UrlEncoded("scope".into(), scope),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token_type":"Bearer","expires_in":3599,"access_token":"arm-token"}"#)
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_arm_token_is_cached_between_calls() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = mock_entra_token(&mut server, 1).await;
        let generate_mock = server
            .mock("POST", format!("{}/generateAccessToken", RESOURCE_PATH).as_str())
            .match_query(Matcher::UrlEncoded(
                "api-version".into(),
                ARM_API_VERSION.into(),
            ))
            .match_header("authorization", "Bearer arm-token")
            .match_body(Matcher::Json(serde_json::json!({
                "permissionType": "Reader",
                "scope": "Account"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"accessToken":"vi-account-token"}"#)
            .expect(2)
            .create_async()
            .await;
        let client = mock_server_client(&server);

        let first = client
            .generate_access_token(AccessPermission::Reader)
            .await
            .unwrap();
        let second = client
            .generate_access_token(AccessPermission::Reader)
            .await
            .unwrap();

        assert_eq!(first, "vi-account-token");
        assert_eq!(second, "vi-account-token");
        // Entra IDトークンは1回だけ取得され、2回目はキャッシュを使う
        token_mock.assert_async().await;
        generate_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_account_normalizes_location() {
        let mut server = mockito::Server::new_async().await;
        let _token_mock = mock_entra_token(&mut server, 1).await;
        let account_mock = server
            .mock("GET", RESOURCE_PATH)
            .match_query(Matcher::UrlEncoded(
                "api-version".into(),
                ARM_API_VERSION.into(),
            ))
            .match_header("authorization", "Bearer arm-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"name":"vi-account","location":"West Europe","properties":{"accountId":"acc-guid"}}"#,
            )
            .create_async()
            .await;
        let client = mock_server_client(&server);

        let info = client.get_account().await.unwrap();

        assert_eq!(
            info,
            AccountInfo {
                account_id: "acc-guid".to_string(),
                location: "westeurope".to_string(),
            }
        );
        account_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_arm_error_status_becomes_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _token_mock = mock_entra_token(&mut server, 1).await;
        let _account_mock = server
            .mock("GET", RESOURCE_PATH)
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error":{"code":"AuthorizationFailed"}}"#)
            .create_async()
            .await;
        let client = mock_server_client(&server);

        match client.get_account().await {
            Err(AzureAuthError::HttpError { status, message }) => {
                assert_eq!(status, 403);
                assert!(message.contains("AuthorizationFailed"));
            }
            other => panic!("HttpErrorを期待: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_entra_token_failure_is_not_cached() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client"}"#)
            .expect(2)
            .create_async()
            .await;
        let client = mock_server_client(&server);

        for _ in 0..2 {
            let result = client.generate_access_token(AccessPermission::Contributor).await;
            assert!(matches!(
                result,
                Err(AzureAuthError::HttpError { status: 401, .. })
            ));
        }
        token_mock.assert_async().await;
    }
}
