/// 字幕ファイル形式
///
/// Video Indexer Captions APIの`format`パラメータに対応する。
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// 未対応の字幕形式が指定された
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("未対応の字幕形式です: {0}")]
pub struct UnsupportedCaptionFormat(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptionFormat {
    #[default]
    Vtt,
    Ttml,
    Srt,
    Txt,
    Csv,
}

impl CaptionFormat {
    /// Captions APIの`format`クエリパラメータ値
    pub fn api_value(&self) -> &'static str {
        match self {
            Self::Vtt => "Vtt",
            Self::Ttml => "Ttml",
            Self::Srt => "Srt",
            Self::Txt => "Txt",
            Self::Csv => "Csv",
        }
    }

    /// 保存時のファイル拡張子
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Vtt => "vtt",
            Self::Ttml => "ttml",
            Self::Srt => "srt",
            Self::Txt => "txt",
            Self::Csv => "csv",
        }
    }

    /// 保存時のContent-Type
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Vtt => "text/vtt; charset=utf-8",
            Self::Ttml => "application/ttml+xml; charset=utf-8",
            Self::Srt => "application/x-subrip; charset=utf-8",
            Self::Txt => "text/plain; charset=utf-8",
            Self::Csv => "text/csv; charset=utf-8",
        }
    }
}

impl FromStr for CaptionFormat {
    type Err = UnsupportedCaptionFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vtt" | "webvtt" => Ok(Self::Vtt),
            "ttml" => Ok(Self::Ttml),
            "srt" => Ok(Self::Srt),
            "txt" => Ok(Self::Txt),
            "csv" => Ok(Self::Csv),
            _ => Err(UnsupportedCaptionFormat(s.to_string())),
        }
    }
}

impl fmt::Display for CaptionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_value())
    }
}
