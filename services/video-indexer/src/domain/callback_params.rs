/// Video Indexerコールバックのクエリパラメータ
///
/// Video IndexerはアップロードAPIに渡したcallbackUrlに対して
/// `id`（ビデオID）と`state`（処理状態）を付与してリクエストする。
/// callbackUrl生成時に付与した`sourceBucket`、`sourceKey`、`token`もそのまま戻ってくる。
use super::{file_stem, CaptionFormat, IndexingState};
use thiserror::Error;

/// ビデオIDパラメータ名
pub const PARAM_VIDEO_ID: &str = "id";
/// 処理状態パラメータ名
pub const PARAM_STATE: &str = "state";
/// 元バケット名パラメータ名
pub const PARAM_SOURCE_BUCKET: &str = "sourceBucket";
/// 元オブジェクトキーパラメータ名
pub const PARAM_SOURCE_KEY: &str = "sourceKey";
/// 共有トークンパラメータ名
pub const PARAM_TOKEN: &str = "token";

/// コールバックパラメータ解析エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackParamsError {
    /// 必須パラメータが欠落
    #[error("必須パラメータがありません: {0}")]
    MissingParameter(&'static str),
}

/// 解析済みのコールバックパラメータ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// Video IndexerのビデオID
    pub video_id: String,
    /// 処理状態
    pub state: IndexingState,
    /// アップロード元のS3バケット名
    pub source_bucket: Option<String>,
    /// アップロード元のS3オブジェクトキー
    pub source_key: Option<String>,
    /// コールバック検証用の共有トークン
    pub token: Option<String>,
}

impl CallbackParams {
    /// クエリパラメータの(名前, 値)ペアから解析する
    ///
    /// パラメータ名は大文字小文字を区別しない。空文字の値は未指定として扱う。
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, CallbackParamsError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut video_id = None;
        let mut state = None;
        let mut source_bucket = None;
        let mut source_key = None;
        let mut token = None;

        for (name, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = if name.eq_ignore_ascii_case(PARAM_VIDEO_ID) {
                &mut video_id
            } else if name.eq_ignore_ascii_case(PARAM_STATE) {
                &mut state
            } else if name.eq_ignore_ascii_case(PARAM_SOURCE_BUCKET) {
                &mut source_bucket
            } else if name.eq_ignore_ascii_case(PARAM_SOURCE_KEY) {
                &mut source_key
            } else if name.eq_ignore_ascii_case(PARAM_TOKEN) {
                &mut token
            } else {
                continue;
            };
            // 同名パラメータが複数ある場合は最初の値を採用
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }

        let video_id = video_id.ok_or(CallbackParamsError::MissingParameter(PARAM_VIDEO_ID))?;
        let state = state
            .map(|s| IndexingState::parse(&s))
            .ok_or(CallbackParamsError::MissingParameter(PARAM_STATE))?;

        Ok(Self {
            video_id,
            state,
            source_bucket,
            source_key,
            token,
        })
    }

    /// 字幕ファイルの保存先キーを生成
    ///
    /// `{prefix}{元キーから拡張子を除いたもの}.{拡張子}`。ディレクトリ部分は保持するため、
    /// 別ディレクトリの同名ビデオが同じキーになることはない。
    /// 元キーが不明な場合はビデオIDを使う。
    pub fn captions_key(&self, prefix: &str, format: CaptionFormat) -> String {
        let base = self
            .source_key
            .as_deref()
            .map(strip_extension)
            .filter(|base| !base.trim().is_empty())
            .unwrap_or_else(|| self.video_id.clone());

        format!("{}{}.{}", prefix, base, format.extension())
    }
}

/// キー末尾のファイル名部分からのみ拡張子を除く
fn strip_extension(key: &str) -> String {
    match key.rsplit_once('/') {
        Some((dir, name)) => {
            let stem = file_stem(name);
            if stem.trim().is_empty() {
                String::new()
            } else {
                format!("{}/{}", dir, stem)
            }
        }
        None => file_stem(key).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_full() {
        let params = CallbackParams::from_pairs(vec![
            ("id", "abc123"),
            ("state", "Processed"),
            ("sourceBucket", "media"),
            ("sourceKey", "videos/talk.mp4"),
            ("token", "secret"),
        ])
        .unwrap();

        assert_eq!(params.video_id, "abc123");
        assert_eq!(params.state, IndexingState::Processed);
        assert_eq!(params.source_bucket.as_deref(), Some("media"));
        assert_eq!(params.source_key.as_deref(), Some("videos/talk.mp4"));
        assert_eq!(params.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_from_pairs_case_insensitive_names() {
        let params =
            CallbackParams::from_pairs(vec![("ID", "v1"), ("State", "failed")]).unwrap();
        assert_eq!(params.video_id, "v1");
        assert_eq!(params.state, IndexingState::Failed);
        assert!(params.source_bucket.is_none());
        assert!(params.source_key.is_none());
        assert!(params.token.is_none());
    }

    #[test]
    fn test_from_pairs_missing_id() {
        let err = CallbackParams::from_pairs(vec![("state", "Processed")]).unwrap_err();
        assert_eq!(err, CallbackParamsError::MissingParameter("id"));
    }

    #[test]
    fn test_from_pairs_empty_id_treated_as_missing() {
        let err =
            CallbackParams::from_pairs(vec![("id", " "), ("state", "Processed")]).unwrap_err();
        assert_eq!(err, CallbackParamsError::MissingParameter("id"));
    }

    #[test]
    fn test_from_pairs_missing_state() {
        let err = CallbackParams::from_pairs(vec![("id", "v1")]).unwrap_err();
        assert_eq!(err, CallbackParamsError::MissingParameter("state"));
        assert!(err.to_string().contains("state"));
    }

    #[test]
    fn test_from_pairs_first_value_wins() {
        let params = CallbackParams::from_pairs(vec![
            ("id", "first"),
            ("id", "second"),
            ("state", "Processed"),
        ])
        .unwrap();
        assert_eq!(params.video_id, "first");
    }

    #[test]
    fn test_captions_key_from_source_key() {
        let params = CallbackParams::from_pairs(vec![
            ("id", "v1"),
            ("state", "Processed"),
            ("sourceKey", "uploads/2024/keynote.mp4"),
        ])
        .unwrap();
        assert_eq!(
            params.captions_key("captions/", CaptionFormat::Vtt),
            "captions/uploads/2024/keynote.vtt"
        );
    }

    #[test]
    fn test_captions_key_distinct_for_same_file_name() {
        let first = CallbackParams::from_pairs(vec![
            ("id", "v1"),
            ("state", "Processed"),
            ("sourceKey", "team-a/talk.mp4"),
        ])
        .unwrap();
        let second = CallbackParams::from_pairs(vec![
            ("id", "v2"),
            ("state", "Processed"),
            ("sourceKey", "team-b/talk.mov"),
        ])
        .unwrap();

        let first_key = first.captions_key("captions/", CaptionFormat::Vtt);
        let second_key = second.captions_key("captions/", CaptionFormat::Vtt);

        assert_eq!(first_key, "captions/team-a/talk.vtt");
        assert_eq!(second_key, "captions/team-b/talk.vtt");
        assert_ne!(first_key, second_key);
    }

    #[test]
    fn test_captions_key_root_level_and_dotted_directory() {
        let root = CallbackParams::from_pairs(vec![
            ("id", "v1"),
            ("state", "Processed"),
            ("sourceKey", "talk.mp4"),
        ])
        .unwrap();
        assert_eq!(root.captions_key("captions/", CaptionFormat::Vtt), "captions/talk.vtt");

        // 拡張子の判定はファイル名部分のみ
        let dotted = CallbackParams::from_pairs(vec![
            ("id", "v2"),
            ("state", "Processed"),
            ("sourceKey", "v1.2/raw"),
        ])
        .unwrap();
        assert_eq!(dotted.captions_key("captions/", CaptionFormat::Vtt), "captions/v1.2/raw.vtt");
    }

    #[test]
    fn test_captions_key_directory_only_falls_back_to_video_id() {
        let params = CallbackParams::from_pairs(vec![
            ("id", "v9"),
            ("state", "Processed"),
            ("sourceKey", "videos/"),
        ])
        .unwrap();
        assert_eq!(params.captions_key("captions/", CaptionFormat::Vtt), "captions/v9.vtt");
    }

    #[test]
    fn test_captions_key_falls_back_to_video_id() {
        let params =
            CallbackParams::from_pairs(vec![("id", "v1"), ("state", "Processed")]).unwrap();
        assert_eq!(params.captions_key("out/", CaptionFormat::Srt), "out/v1.srt");
    }
}
