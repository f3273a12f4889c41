// Video Indexer API呼び出しセッション
//
// 1回のLambda呼び出しの中で、アカウント情報とアカウントアクセストークンを一度だけ取得して使い回す。

use tracing::info;

use crate::infrastructure::{AccessPermission, AccountInfo, AccountOps, AzureAuthError};

/// アカウント情報とアクセストークンの組
#[derive(Debug, Clone)]
pub struct IndexerSession {
    /// Video Indexerアカウント情報
    pub account: AccountInfo,
    /// アカウントアクセストークン
    pub access_token: String,
}

impl IndexerSession {
    /// ARMからアカウント情報を解決し、指定権限のアクセストークンを発行する
    pub async fn open<A>(account_ops: &A, permission: AccessPermission) -> Result<Self, AzureAuthError>
    where
        A: AccountOps + ?Sized,
    {
        let account = account_ops.get_account().await?;
        let access_token = account_ops.generate_access_token(permission).await?;

        info!(
            account_id = %account.account_id,
            location = %account.location,
            permission = permission.as_str(),
            "Video Indexerセッションを開始"
        );

        Ok(Self {
            account,
            access_token,
        })
    }
}
