/// ログ基盤モジュール
///
/// uploadおよびcallback Lambda向けの構造化ログ設定を提供する。
/// CloudWatch Logsで検索しやすいよう、JSON形式でフィールドをフラットに出力する。
use std::sync::Once;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログサブスクライバー初期化用の同期プリミティブ
static INIT: Once = Once::new();

/// デフォルトのログレベル
///
/// AWS SDKとhyperのdebugログは量が多いため、クレート自身のみinfoで出力する。
const DEFAULT_FILTER: &str = "info,aws_config=warn,aws_smithy_runtime=warn,hyper=warn";

/// Lambda環境向けのログサブスクライバーを初期化する
///
/// 環境変数`RUST_LOG`が設定されていればそれを優先する。
/// 複数回呼び出しても最初の呼び出しのみ初期化を実行する。
///
/// # 使用例
/// ```ignore
/// use video_indexer::infrastructure::init_logging;
///
/// init_logging();
/// tracing::info!(bucket = "media", key = "videos/a.mp4", "S3イベント受信");
/// ```
pub fn init_logging() {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        // JSON形式のログレイヤー（CloudWatch向け）
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false);

        // lambda_runtimeがすでにグローバルサブスクライバーを設定している場合は無視する
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init();
    });
}

/// テスト用のログサブスクライバーを初期化する（人間が読みやすい形式）
#[cfg(test)]
pub fn init_test_logging() {
    static TEST_INIT: Once = Once::new();

    TEST_INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_target(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_idempotent() {
        init_test_logging();
        init_test_logging();
        // 本番用の初期化もテスト用サブスクライバー設定後に呼び出してパニックしない
        init_logging();
        init_logging();
    }

    #[test]
    fn test_default_filter_parses() {
        let _filter = EnvFilter::new(DEFAULT_FILTER);
    }

    /// ビデオ処理のコンテキストをspanで引き回せることを確認
    #[test]
    fn test_span_context() {
        init_test_logging();

        let span = tracing::info_span!("upload", bucket = "media", key = "videos/a.mp4");
        let _guard = span.enter();

        tracing::info!(video_id = "abc123", state = "Uploaded", "ビデオ登録完了");
        tracing::debug!("署名付きURL発行");
    }
}
