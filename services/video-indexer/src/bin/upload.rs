/// S3 ObjectCreated → Video Indexer アップロード Lambda関数
///
/// バケットに置かれたビデオの署名付きURLを発行し、Video Indexerにインデックス化を依頼する。
/// 処理完了はコールバックURL（callback Lambda）に通知される。
use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use tokio::sync::OnceCell;
use tracing::{error, info};
use video_indexer::application::{UploadHandler, UploadSettings};
use video_indexer::infrastructure::{
    init_logging, ArmClient, IndexerConfig, S3Storage, VideoIndexerClient,
};

type Handler = UploadHandler<ArmClient, VideoIndexerClient, S3Storage>;

/// UploadHandlerの静的インスタンス
///
/// warm start時にAzureのトークンキャッシュとHTTPクライアントを再利用する。
static UPLOAD_HANDLER: OnceCell<Handler> = OnceCell::const_new();

/// UploadHandlerを取得（初期化されていなければ初期化）
async fn get_handler() -> Result<&'static Handler, Error> {
    UPLOAD_HANDLER
        .get_or_try_init(|| async {
            let config = IndexerConfig::from_env_with_ssm().await?;
            let account_ops = ArmClient::new(config.azure().clone(), config.client_secret())?;
            let indexer = VideoIndexerClient::new(config.api_url())?;
            let storage = S3Storage::from_config().await;
            Ok::<_, Error>(UploadHandler::new(
                account_ops,
                indexer,
                storage,
                UploadSettings::from(&config),
            ))
        })
        .await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    // Lambda関数を初期化して実行
    let func = service_fn(handler);
    lambda_runtime::run(func).await?;
    Ok(())
}

/// Lambda関数のメインハンドラー
///
/// # 処理フロー
/// 1. 設定とクライアントを初期化（初回のみ）
/// 2. UploadHandlerでS3イベントの各レコードを処理
/// 3. 処理結果をログに記録
async fn handler(event: LambdaEvent<S3Event>) -> Result<(), Error> {
    let event = event.payload;

    info!(record_count = event.records.len(), "S3イベントを受信");

    let upload_handler = match get_handler().await {
        Ok(handler) => handler,
        Err(err) => {
            error!(error = %err, "アップロードハンドラーの初期化失敗");
            return Err(err);
        }
    };

    let result = upload_handler.process_event(&event).await;

    info!(
        success_count = result.success_count,
        failure_count = result.failure_count,
        skip_count = result.skip_count,
        "アップロード処理完了"
    );

    // 失敗があった場合はエラーを返す（Lambda再試行をトリガー）
    if result.failure_count > 0 {
        return Err(format!(
            "アップロード処理に失敗: {} 件の失敗",
            result.failure_count
        )
        .into());
    }

    Ok(())
}
