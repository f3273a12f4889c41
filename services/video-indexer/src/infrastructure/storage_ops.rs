//! S3操作モジュール
//!
//! - Video Indexerにダウンロードさせるための署名付きGET URLを発行
//! - 取得した字幕ファイルをバケットに保存

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// S3操作のエラー型
#[derive(Debug, Error)]
pub enum StorageError {
    /// 署名付きURLの設定が不正（有効期限が範囲外など）
    #[error("署名付きURL設定エラー: {0}")]
    PresignConfig(String),
    /// AWS SDK エラー
    #[error("AWS S3 APIエラー: {0}")]
    AwsSdkError(String),
}

/// ビデオストレージ操作トレイト（テスト用の抽象化）
#[async_trait]
pub trait VideoStorage: Send + Sync {
    /// オブジェクトを読み取るための期限付きURLを発行する
    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    /// 字幕ファイルを保存する
    async fn put_captions(
        &self,
        bucket: &str,
        key: &str,
        body: String,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// 実際のAWS S3 SDKを使用したストレージ実装
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
}

impl S3Storage {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// AWS設定からデフォルトのクライアントを作成
    pub async fn from_config() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(S3Client::new(&config))
    }
}

#[async_trait]
impl VideoStorage for S3Storage {
    #[instrument(skip(self))]
    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignConfig(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                warn!(error = %e, "署名付きURLの発行に失敗");
                StorageError::AwsSdkError(e.to_string())
            })?;

        info!(expires_in_secs = expires_in.as_secs(), "署名付きURLを発行");
        Ok(request.uri().to_string())
    }

    #[instrument(skip(self, body), fields(bytes = body.len()))]
    async fn put_captions(
        &self,
        bucket: &str,
        key: &str,
        body: String,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body.into_bytes()))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "字幕ファイルの保存に失敗");
                StorageError::AwsSdkError(e.to_string())
            })?;

        info!("字幕ファイルを保存");
        Ok(())
    }
}
