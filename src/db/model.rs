use sqlx::FromRow;

/// 图片记录
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct MediaRecord {
    /// 图片内容的 blake3 哈希，十六进制
    pub fingerprint: String,
    /// 图片当前所在的绝对路径
    pub path: String,
    /// 首次添加时间，RFC 3339
    pub added_at: String,
    /// 最近一次修改路径的时间，RFC 3339
    pub updated_at: String,
}

impl MediaRecord {
    /// 新发现的图片，添加时间与修改时间相同
    pub fn new(fingerprint: impl Into<String>, path: impl Into<String>, now: &str) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            path: path.into(),
            added_at: now.to_owned(),
            updated_at: now.to_owned(),
        }
    }
}
