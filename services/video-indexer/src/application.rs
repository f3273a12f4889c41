// アプリケーション層モジュール
pub mod callback_handler;
pub mod indexer_session;
pub mod upload_handler;

// 再エクスポート
pub use callback_handler::{
    CallbackError, CallbackHandler, CallbackOutcome, CallbackResponseBody, CallbackSettings,
    ErrorBody,
};
pub use indexer_session::IndexerSession;
pub use upload_handler::{UploadAction, UploadError, UploadHandler, UploadResult, UploadSettings};
