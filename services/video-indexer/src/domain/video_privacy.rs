/// Video Indexerに登録するビデオの公開範囲
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("未対応の公開範囲です: {0}")]
pub struct UnsupportedPrivacy(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoPrivacy {
    #[default]
    Private,
    Public,
}

impl VideoPrivacy {
    /// アップロードAPIの`privacy`クエリパラメータ値
    pub fn api_value(&self) -> &'static str {
        match self {
            Self::Private => "Private",
            Self::Public => "Public",
        }
    }
}

impl FromStr for VideoPrivacy {
    type Err = UnsupportedPrivacy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            _ => Err(UnsupportedPrivacy(s.to_string())),
        }
    }
}
