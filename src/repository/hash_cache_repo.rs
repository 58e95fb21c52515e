// ==========================================
// 批量导入管线 - 哈希缓存仓储
// ==========================================
// 职责: 管理 import_source_cache / import_transformed_cache 表的 CRUD
// 红线: 不含新鲜度判定以外的业务逻辑；新鲜度由调用方决定
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::cache::{format_cache_timestamp, parse_cache_timestamp, CacheEntry, CachedHash};
use crate::domain::element::ElementNumber;
use crate::domain::types::CacheStage;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

// ==========================================
// HashCacheRepository Trait
// ==========================================
// 用途: 两个缓存阶段共用的契约
// 实现者: SqliteHashCacheRepository
pub trait HashCacheRepository: Send + Sync {
    /// 所属缓存阶段
    fn stage(&self) -> CacheStage;

    /// 按 (prefix, hash_key) 批量查询
    ///
    /// # 参数
    /// - prefix: 导入器命名空间
    /// - keys: 元素编号 → hash_key
    ///
    /// # 返回
    /// - 元素编号 → 命中记录（过期记录同样返回）
    fn lookup(
        &self,
        prefix: &str,
        keys: &BTreeMap<ElementNumber, String>,
    ) -> RepositoryResult<BTreeMap<ElementNumber, CachedHash>>;

    /// 按主键加载
    fn find(&self, cache_id: i64) -> RepositoryResult<Option<CacheEntry>>;

    /// 保存摘要
    ///
    /// # 说明
    /// - existing_cache_id 存在: 原地更新 data_hash / expires_at
    /// - 否则插入新记录
    ///
    /// # 返回
    /// - 记录的 cache_id
    fn save(
        &self,
        prefix: &str,
        hash_key: &str,
        data_hash: &str,
        expires_at: DateTime<Utc>,
        existing_cache_id: Option<i64>,
    ) -> RepositoryResult<i64>;

    /// 删除单条记录（外部失效工具使用，管线本身不调用）
    fn clear(&self, prefix: &str, hash_key: &str) -> RepositoryResult<bool>;

    /// 删除某个命名空间下的全部记录
    fn clear_prefix(&self, prefix: &str) -> RepositoryResult<usize>;
}

// ==========================================
// SqliteHashCacheRepository
// ==========================================
pub struct SqliteHashCacheRepository {
    conn: Arc<Mutex<Connection>>,
    stage: CacheStage,
}

impl SqliteHashCacheRepository {
    /// 创建新的仓储实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - stage: 缓存阶段（决定表名与分块大小）
    pub fn new(db_path: &str, stage: CacheStage) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            stage,
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>, stage: CacheStage) -> Self {
        Self { conn, stage }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn table(&self) -> &'static str {
        self.stage.table_name()
    }

    /// 查询单个分块（同一 hash_key 可能对应多个元素编号）
    fn lookup_chunk(
        conn: &Connection,
        table: &str,
        prefix: &str,
        chunk: &[(&ElementNumber, &String)],
        result: &mut BTreeMap<ElementNumber, CachedHash>,
    ) -> RepositoryResult<()> {
        let mut numbers_by_key: HashMap<&str, Vec<ElementNumber>> = HashMap::new();
        for (number, key) in chunk {
            numbers_by_key
                .entry(key.as_str())
                .or_default()
                .push(**number);
        }

        let distinct_keys: Vec<&str> = numbers_by_key.keys().copied().collect();
        let placeholders = (0..distinct_keys.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT cache_id, hash_key, data_hash, expires_at FROM {} WHERE prefix = ?1 AND hash_key IN ({})",
            table, placeholders
        );

        let mut bind: Vec<&str> = Vec::with_capacity(distinct_keys.len() + 1);
        bind.push(prefix);
        bind.extend(distinct_keys.iter().copied());

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        for row in rows {
            let (cache_id, hash_key, data_hash, expires_raw) = row?;

            // 无法解析的过期时间视为已过期：记录仍返回，但不会判定为新鲜
            let expires_at = parse_cache_timestamp(&expires_raw).unwrap_or_else(|| {
                warn!(table, cache_id, expires_at = %expires_raw, "缓存过期时间无法解析，按已过期处理");
                DateTime::<Utc>::MIN_UTC
            });

            if let Some(numbers) = numbers_by_key.get(hash_key.as_str()) {
                for number in numbers {
                    result.insert(
                        *number,
                        CachedHash {
                            cache_id,
                            data_hash: data_hash.clone(),
                            expires_at,
                        },
                    );
                }
            }
        }

        Ok(())
    }
}

impl HashCacheRepository for SqliteHashCacheRepository {
    fn stage(&self) -> CacheStage {
        self.stage
    }

    fn lookup(
        &self,
        prefix: &str,
        keys: &BTreeMap<ElementNumber, String>,
    ) -> RepositoryResult<BTreeMap<ElementNumber, CachedHash>> {
        let mut result = BTreeMap::new();
        if keys.is_empty() {
            return Ok(result);
        }

        let conn = self.get_conn()?;
        let pairs: Vec<(&ElementNumber, &String)> = keys.iter().collect();
        let chunk_size = self.stage.lookup_chunk_size();

        for chunk in pairs.chunks(chunk_size) {
            Self::lookup_chunk(&conn, self.table(), prefix, chunk, &mut result)?;
        }

        debug!(
            stage = %self.stage,
            prefix,
            requested = keys.len(),
            found = result.len(),
            "缓存批量查询完成"
        );

        Ok(result)
    }

    fn find(&self, cache_id: i64) -> RepositoryResult<Option<CacheEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT cache_id, prefix, hash_key, data_hash, created_at, updated_at, expires_at FROM {} WHERE cache_id = ?1",
            self.table()
        );

        let row = conn
            .query_row(&sql, params![cache_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .optional()?;

        let Some((cache_id, prefix, hash_key, data_hash, created, updated, expires)) = row else {
            return Ok(None);
        };

        let parse = |field: &str, raw: &str| {
            parse_cache_timestamp(raw).ok_or_else(|| RepositoryError::FieldValueError {
                field: field.to_string(),
                message: format!("无法解析时间戳: {}", raw),
            })
        };

        Ok(Some(CacheEntry {
            cache_id,
            prefix,
            hash_key,
            data_hash,
            created_at: parse("created_at", &created)?,
            updated_at: parse("updated_at", &updated)?,
            expires_at: parse("expires_at", &expires)?,
        }))
    }

    fn save(
        &self,
        prefix: &str,
        hash_key: &str,
        data_hash: &str,
        expires_at: DateTime<Utc>,
        existing_cache_id: Option<i64>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let now = format_cache_timestamp(Utc::now());
        let expires = format_cache_timestamp(expires_at);

        if let Some(cache_id) = existing_cache_id {
            let updated = conn.execute(
                &format!(
                    "UPDATE {} SET data_hash = ?1, expires_at = ?2, updated_at = ?3 WHERE cache_id = ?4",
                    self.table()
                ),
                params![data_hash, expires, now, cache_id],
            )?;

            if updated > 0 {
                return Ok(cache_id);
            }

            // 记录已被外部清理: 退化为按 (prefix, hash_key) 插入
            warn!(stage = %self.stage, cache_id, prefix, hash_key, "缓存记录不存在，改为重新插入");
        }

        conn.execute(
            &format!(
                r#"
                INSERT INTO {} (prefix, hash_key, data_hash, created_at, updated_at, expires_at)
                VALUES (?1, ?2, ?3, ?4, ?4, ?5)
                ON CONFLICT(prefix, hash_key) DO UPDATE SET
                    data_hash = excluded.data_hash,
                    updated_at = excluded.updated_at,
                    expires_at = excluded.expires_at
                "#,
                self.table()
            ),
            params![prefix, hash_key, data_hash, now, expires],
        )?;

        let cache_id = conn.query_row(
            &format!(
                "SELECT cache_id FROM {} WHERE prefix = ?1 AND hash_key = ?2",
                self.table()
            ),
            params![prefix, hash_key],
            |row| row.get::<_, i64>(0),
        )?;

        Ok(cache_id)
    }

    fn clear(&self, prefix: &str, hash_key: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            &format!(
                "DELETE FROM {} WHERE prefix = ?1 AND hash_key = ?2",
                self.table()
            ),
            params![prefix, hash_key],
        )?;
        Ok(deleted > 0)
    }

    fn clear_prefix(&self, prefix: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE prefix = ?1", self.table()),
            params![prefix],
        )?;
        Ok(deleted)
    }
}
