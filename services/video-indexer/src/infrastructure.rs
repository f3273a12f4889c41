// インフラストラクチャ層モジュール
pub mod azure_auth;
pub mod callback_url;
pub mod config;
pub mod logging;
pub mod ssm_ops;
pub mod storage_ops;
pub mod video_indexer_client;

// 再エクスポート
pub use azure_auth::{AccessPermission, AccountInfo, AccountOps, ArmClient, AzureAuthError};
pub use callback_url::build_callback_url;
pub use config::{AzureAccountConfig, ConfigError, IndexerConfig};
pub use logging::init_logging;
pub use ssm_ops::{AwsSsmOps, SecretOps, SsmOpsError};
pub use storage_ops::{S3Storage, StorageError, VideoStorage};
pub use video_indexer_client::{
    UploadRequest, UploadedVideo, VideoIndexerApi, VideoIndexerClient, VideoIndexerError,
};
