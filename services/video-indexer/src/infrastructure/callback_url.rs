// コールバックURL構築
//
// Video Indexerに渡すcallbackUrlに、字幕の保存先を決めるための元オブジェクト情報と
// 検証用トークンを付与する。Video Indexerは既存のクエリを保持したまま`id`と`state`を追加する。

use crate::domain::callback_params::{PARAM_SOURCE_BUCKET, PARAM_SOURCE_KEY, PARAM_TOKEN};
use url::Url;

/// コールバックURLを構築する
///
/// # 引数
/// * `base` - コールバック受信LambdaのURL（既存クエリは保持される）
/// * `bucket` - 元ビデオのバケット名
/// * `key` - 元ビデオのオブジェクトキー
/// * `token` - コールバック検証用の共有トークン
pub fn build_callback_url(
    base: &str,
    bucket: &str,
    key: &str,
    token: &str,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair(PARAM_SOURCE_BUCKET, bucket)
        .append_pair(PARAM_SOURCE_KEY, key)
        .append_pair(PARAM_TOKEN, token);
    Ok(url.into())
}
