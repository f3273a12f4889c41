/// Video Indexerのインデックス処理状態
///
/// アップロードレスポンスの`state`フィールドおよび
/// コールバックURLの`state`クエリパラメータで通知される値。
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexingState {
    /// アップロード完了、処理待ち
    Uploaded,
    /// インデックス処理中
    Processing,
    /// インデックス処理完了（字幕取得可能）
    Processed,
    /// インデックス処理失敗
    Failed,
    /// コンテンツポリシー違反により隔離
    Quarantined,
    /// 未知の状態（将来のAPI拡張に備えて値を保持）
    Unknown(String),
}

impl IndexingState {
    /// 状態文字列を解析する（大文字小文字を区別しない）
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "uploaded" => Self::Uploaded,
            "processing" => Self::Processing,
            "processed" => Self::Processed,
            "failed" => Self::Failed,
            "quarantined" => Self::Quarantined,
            _ => Self::Unknown(value.trim().to_string()),
        }
    }

    /// これ以上状態が変化しない終端状態かどうか
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed | Self::Quarantined)
    }

    /// 処理が失敗で終わったかどうか
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Quarantined)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Uploaded => "Uploaded",
            Self::Processing => "Processing",
            Self::Processed => "Processed",
            Self::Failed => "Failed",
            Self::Quarantined => "Quarantined",
            Self::Unknown(value) => value,
        }
    }
}

impl fmt::Display for IndexingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_states_case_insensitive() {
        assert_eq!(IndexingState::parse("Processed"), IndexingState::Processed);
        assert_eq!(IndexingState::parse("processing"), IndexingState::Processing);
        assert_eq!(IndexingState::parse(" FAILED "), IndexingState::Failed);
        assert_eq!(IndexingState::parse("Uploaded"), IndexingState::Uploaded);
        assert_eq!(IndexingState::parse("Quarantined"), IndexingState::Quarantined);
    }

    #[test]
    fn test_parse_unknown_keeps_value() {
        let state = IndexingState::parse("Reindexing");
        assert_eq!(state, IndexingState::Unknown("Reindexing".to_string()));
        assert_eq!(state.to_string(), "Reindexing");
    }

    #[test]
    fn test_terminal_states() {
        assert!(IndexingState::Processed.is_terminal());
        assert!(IndexingState::Failed.is_terminal());
        assert!(IndexingState::Quarantined.is_terminal());
        assert!(!IndexingState::Uploaded.is_terminal());
        assert!(!IndexingState::Processing.is_terminal());
        assert!(!IndexingState::Unknown("x".to_string()).is_terminal());
    }

    #[test]
    fn test_failure_states() {
        assert!(IndexingState::Failed.is_failure());
        assert!(IndexingState::Quarantined.is_failure());
        assert!(!IndexingState::Processed.is_failure());
    }
}
