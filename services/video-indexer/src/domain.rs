// ドメイン層モジュール
pub mod callback_params;
pub mod caption_format;
pub mod indexing_state;
pub mod video_object;
pub mod video_privacy;

// 再エクスポート
pub use callback_params::{CallbackParams, CallbackParamsError};
pub use caption_format::{CaptionFormat, UnsupportedCaptionFormat};
pub use indexing_state::IndexingState;
pub use video_object::{decode_event_key, file_stem, VideoObject, VideoObjectError};
pub use video_privacy::{UnsupportedPrivacy, VideoPrivacy};
