//! 时间戳编码
//!
//! 统一使用定宽 UTC 格式（微秒精度，Z 结尾），保证 TEXT 列可以直接按字典序比较

use chrono::{DateTime, SecondsFormat, Utc};

use crate::application::ports::RepositoryError;

pub(crate) fn encode(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::SerializationError(e.to_string()))
}

pub(crate) fn decode_opt(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(decode).transpose()
}
