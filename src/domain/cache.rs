// ==========================================
// 批量导入管线 - 哈希缓存模型
// ==========================================
// 对齐: import_source_cache / import_transformed_cache 表
// 约束: (prefix, hash_key) 唯一；data_hash 仅在其 prefix 内有意义
// ==========================================

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 缓存表时间戳存储格式（UTC）
pub const CACHE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// CacheEntry - 缓存记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_id: i64,             // 代理主键
    pub prefix: String,            // 导入器命名空间
    pub hash_key: String,          // 元素身份键
    pub data_hash: String,         // 内容摘要
    pub created_at: DateTime<Utc>, // 创建时间
    pub updated_at: DateTime<Utc>, // 更新时间
    pub expires_at: DateTime<Utc>, // 过期时间
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// ==========================================
// CachedHash - 批量查询结果（按元素编号）
// ==========================================
// 过期记录同样返回，由调用方判定新鲜度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedHash {
    pub cache_id: i64,
    pub data_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedHash {
    /// 记录存在 + 摘要一致 + 未过期 → 当前有效
    pub fn is_valid_for(&self, data_hash: &str, now: DateTime<Utc>) -> bool {
        self.data_hash == data_hash && now < self.expires_at
    }
}

/// 格式化为缓存表时间戳
pub fn format_cache_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(CACHE_TIMESTAMP_FORMAT).to_string()
}

/// 解析缓存表时间戳（兼容 RFC3339）
pub fn parse_cache_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), CACHE_TIMESTAMP_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cached_hash_freshness() {
        let now = Utc::now();
        let cached = CachedHash {
            cache_id: 1,
            data_hash: "h1".to_string(),
            expires_at: now + Duration::hours(1),
        };

        assert!(cached.is_valid_for("h1", now));
        assert!(!cached.is_valid_for("h2", now));
        assert!(!cached.is_valid_for("h1", now + Duration::hours(2)));
    }

    #[test]
    fn test_cache_timestamp_format() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let raw = format_cache_timestamp(ts);
        assert_eq!(raw, "2026-03-04 05:06:07");
        assert_eq!(parse_cache_timestamp(&raw), Some(ts));
        assert_eq!(parse_cache_timestamp("2026-03-04T05:06:07Z"), Some(ts));
        assert_eq!(parse_cache_timestamp("garbage"), None);
    }
}
