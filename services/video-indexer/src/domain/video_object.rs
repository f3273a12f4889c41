/// S3オブジェクトとして到着したビデオファイル
///
/// S3 ObjectCreated通知の1レコードから構築され、
/// Video Indexerへ送信するかどうかの判定と表示名の導出を行う。
use thiserror::Error;

/// Video Indexerが受け付けるビデオ名の最大文字数
pub const MAX_VIDEO_NAME_CHARS: usize = 80;

/// ビデオとして扱うファイル拡張子（小文字）
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "wmv", "webm", "m4v", "mpg", "mpeg", "3gp", "flv", "mxf", "ts",
];

/// VideoObject構築時のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoObjectError {
    /// バケット名が空
    #[error("バケット名が空です")]
    EmptyBucket,
    /// オブジェクトキーが空
    #[error("オブジェクトキーが空です")]
    EmptyKey,
}

/// S3上のビデオオブジェクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoObject {
    bucket: String,
    key: String,
    size: i64,
}

impl VideoObject {
    /// デコード済みのキーからVideoObjectを作成
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        size: i64,
    ) -> Result<Self, VideoObjectError> {
        let bucket = bucket.into();
        let key = key.into();

        if bucket.trim().is_empty() {
            return Err(VideoObjectError::EmptyBucket);
        }
        if key.trim().is_empty() {
            return Err(VideoObjectError::EmptyKey);
        }

        Ok(Self { bucket, key, size })
    }

    /// S3イベント通知のキー（URLエンコード済み）からVideoObjectを作成
    ///
    /// S3通知のキーはフォームエンコードされている（スペースは`+`、その他は`%XX`）。
    pub fn from_event_key(
        bucket: impl Into<String>,
        encoded_key: &str,
        size: i64,
    ) -> Result<Self, VideoObjectError> {
        Self::new(bucket, decode_event_key(encoded_key), size)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    /// 空オブジェクトかどうか
    pub fn is_empty(&self) -> bool {
        self.size <= 0
    }

    /// キーの末尾のファイル名部分
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// 拡張子（小文字）。拡張子がない場合はNone
    pub fn extension(&self) -> Option<String> {
        let file_name = self.file_name();
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// ビデオファイルとして扱う拡張子かどうか
    pub fn is_video(&self) -> bool {
        self.extension()
            .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
    }

    /// 指定プレフィックス配下のオブジェクトかどうか
    pub fn is_under_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.key.starts_with(prefix)
    }

    /// Video Indexerに登録するビデオ名
    ///
    /// ファイル名から拡張子を除いたものを最大80文字に切り詰める。
    /// 結果が空になる場合はファイル名をそのまま使う。
    pub fn video_name(&self) -> String {
        let name = file_stem(self.file_name());
        let name = if name.trim().is_empty() {
            self.file_name()
        } else {
            name
        };
        name.chars().take(MAX_VIDEO_NAME_CHARS).collect()
    }
}

/// ファイル名から拡張子を除いた部分を返す
///
/// `.hidden`のようにドットで始まる名前はそのまま返す。
pub fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// S3イベント通知のオブジェクトキーをデコードする
///
/// `&`と`=`はキーの一部として扱うため、事前にエスケープしてから1ペアとして解析する。
pub fn decode_event_key(encoded_key: &str) -> String {
    let escaped = encoded_key.replace('&', "%26").replace('=', "%3D");
    url::form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}
