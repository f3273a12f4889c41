/// Video Indexer コールバック HTTP Lambdaエントリポイント
///
/// Lambda Function URL経由でインデックス処理の状態通知を受け取り、
/// 処理完了時に字幕を取得してS3に保存する。
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tokio::sync::OnceCell;
use tracing::{error, info};
use video_indexer::application::{CallbackHandler, CallbackSettings};
use video_indexer::infrastructure::{
    init_logging, ArmClient, IndexerConfig, S3Storage, VideoIndexerClient,
};

type Handler = CallbackHandler<ArmClient, VideoIndexerClient, S3Storage>;

/// CallbackHandlerの静的インスタンス
static CALLBACK_HANDLER: OnceCell<Handler> = OnceCell::const_new();

/// CallbackHandlerを取得（初期化されていなければ初期化）
async fn get_handler() -> Result<&'static Handler, Error> {
    CALLBACK_HANDLER
        .get_or_try_init(|| async {
            let config = IndexerConfig::from_env_with_ssm().await?;
            let account_ops = ArmClient::new(config.azure().clone(), config.client_secret())?;
            let indexer = VideoIndexerClient::new(config.api_url())?;
            let storage = S3Storage::from_config().await;
            Ok::<_, Error>(CallbackHandler::new(
                account_ops,
                indexer,
                storage,
                CallbackSettings::from(&config),
            ))
        })
        .await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    info!("コールバックLambda関数を初期化");

    // Lambda関数を実行
    run(service_fn(handler)).await
}

/// HTTPリクエストハンドラー
async fn handler(request: Request) -> Result<Response<Body>, Error> {
    let callback_handler = match get_handler().await {
        Ok(handler) => handler,
        Err(err) => {
            error!(error = %err, "コールバックハンドラーの初期化失敗");
            return Err(err);
        }
    };

    Ok(callback_handler.handle(&request).await?)
}
