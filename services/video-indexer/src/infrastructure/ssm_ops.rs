//! SSM操作モジュール
//!
//! Azureクライアントシークレットやコールバック検証トークンなど、
//! 環境変数に平文で置きたくない値をSSM Parameter Store（SecureString）から取得する。

use async_trait::async_trait;
use aws_sdk_ssm::Client as SsmClient;
use thiserror::Error;
use tracing::{info, warn};

/// SSM操作のエラー型
#[derive(Debug, Error)]
pub enum SsmOpsError {
    /// AWS SDK エラー
    #[error("AWS SSM APIエラー: {0}")]
    AwsSdkError(String),
    /// パラメータに値が含まれていない
    #[error("パラメータの値が空です: {0}")]
    EmptyValue(String),
}

/// シークレット取得トレイト（テスト用の抽象化）
#[async_trait]
pub trait SecretOps: Send + Sync {
    /// 復号済みのパラメータ値を取得する
    ///
    /// # 引数
    /// * `name` - パラメータ名（例: `/video-indexer/azure-client-secret`）
    async fn get_secure_parameter(&self, name: &str) -> Result<String, SsmOpsError>;
}

/// 実際のAWS SSM SDKを使用したシークレット取得実装
pub struct AwsSsmOps {
    client: SsmClient,
}

impl AwsSsmOps {
    pub fn new(client: SsmClient) -> Self {
        Self { client }
    }

    /// AWS設定からデフォルトのクライアントを作成
    pub async fn from_config() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(SsmClient::new(&config))
    }
}

#[async_trait]
impl SecretOps for AwsSsmOps {
    async fn get_secure_parameter(&self, name: &str) -> Result<String, SsmOpsError> {
        info!(parameter = %name, "SSMパラメータ取得開始");

        let response = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|err| {
                warn!(parameter = %name, error = %err, "GetParameterエラー");
                SsmOpsError::AwsSdkError(err.to_string())
            })?;

        let value = response
            .parameter()
            .and_then(|p| p.value())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SsmOpsError::EmptyValue(name.to_string()))?;

        Ok(value.to_string())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// テスト用のモックシークレット取得
    #[derive(Default)]
    pub struct MockSecretOps {
        values: HashMap<String, String>,
        call_count: AtomicUsize,
    }

    impl MockSecretOps {
        pub fn with_value(mut self, name: &str, value: &str) -> Self {
            self.values.insert(name.to_string(), value.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SecretOps for MockSecretOps {
        async fn get_secure_parameter(&self, name: &str) -> Result<String, SsmOpsError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.values
                .get(name)
                .cloned()
                .ok_or_else(|| SsmOpsError::AwsSdkError(format!("ParameterNotFound: {}", name)))
        }
    }
}
