// ==========================================
// 批量导入管线 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 键格式: import/<导入器>/<配置项>
// ==========================================

use crate::config::import_config::{CacheExpiry, ImportConfig};
use crate::db::open_sqlite_connection;
use crate::domain::cache::parse_cache_timestamp;
use crate::domain::types::CacheStage;
use crate::importer::error::{ImportError, ImportResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ImportResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> ImportResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| ImportError::Database(format!("锁获取失败: {}", e)))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ImportResult<Option<String>> {
        let conn = self.get_conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 写入 global scope 配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ImportResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 写入某个导入器的配置项
    pub fn set_import_setting(&self, importer: &str, setting: &str, value: &str) -> ImportResult<()> {
        self.set_global_config_value(&config_keys::import_key(importer, setting), value)
    }

    /// 读取某个导入器的全部配置项（配置项 → 值）
    fn import_settings(&self, importer: &str) -> ImportResult<HashMap<String, String>> {
        let conn = self.get_conn()?;
        let prefix = config_keys::import_key(importer, "");

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' AND substr(key, 1, length(?1)) = ?1",
        )?;
        let rows = stmt.query_map(params![prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut settings = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            if let Some(setting) = key.strip_prefix(&prefix) {
                settings.insert(setting.to_string(), value);
            }
        }

        Ok(settings)
    }

    /// 加载导入器配置: 默认值 + config_kv 覆写
    ///
    /// # 说明
    /// - 缺失键保留默认值
    /// - 格式错误返回 ImportError::Config
    #[instrument(skip(self))]
    pub fn load_import_config(&self, importer: &str) -> ImportResult<ImportConfig> {
        let settings = self.import_settings(importer)?;
        let mut config = ImportConfig::for_importer(importer);

        for stage in [CacheStage::Source, CacheStage::Transformed] {
            let keys = config_keys::stage_keys(stage);
            let stage_config = config.cache_mut(stage);

            if let Some(raw) = settings.get(keys.enabled) {
                stage_config.enabled = parse_bool(importer, keys.enabled, raw)?;
            }
            if let Some(raw) = settings.get(keys.prefix) {
                stage_config.prefix = raw.trim().to_string();
            }
            if let Some(raw) = settings.get(keys.expiry_seconds) {
                stage_config.expiry = CacheExpiry::Seconds(parse_seconds(importer, keys.expiry_seconds, raw)?);
            }
            if let Some(raw) = settings.get(keys.expires_at) {
                let at = parse_cache_timestamp(raw)
                    .ok_or_else(|| config_error(importer, keys.expires_at, raw, "无法解析时间戳"))?;
                stage_config.expiry = CacheExpiry::At(at);
            }
        }

        if let Some(raw) = settings.get(config_keys::TEST) {
            config.test = parse_bool(importer, config_keys::TEST, raw)?;
        }

        let rules = &mut config.attribute_rules;
        if let Some(raw) = settings.get(config_keys::ALLOW_AUTO_CREATE_OPTIONS) {
            rules.allow_auto_create_options = parse_bool(importer, config_keys::ALLOW_AUTO_CREATE_OPTIONS, raw)?;
        }
        if let Some(raw) = settings.get(config_keys::WARN_ON_UNKNOWN_FIELDS) {
            rules.warn_on_unknown_fields = parse_bool(importer, config_keys::WARN_ON_UNKNOWN_FIELDS, raw)?;
        }
        if let Some(raw) = settings.get(config_keys::PRICE_SCOPE_GLOBAL) {
            rules.price_scope_global = parse_bool(importer, config_keys::PRICE_SCOPE_GLOBAL, raw)?;
        }

        debug!(importer, overrides = settings.len(), "导入配置加载完成");
        Ok(config)
    }
}

fn config_error(importer: &str, setting: &str, raw: &str, message: &str) -> ImportError {
    ImportError::Config {
        key: config_keys::import_key(importer, setting),
        value: raw.to_string(),
        message: message.to_string(),
    }
}

/// 解析布尔配置（接受 true/false、1/0、yes/no、on/off）
fn parse_bool(importer: &str, setting: &str, raw: &str) -> ImportResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(config_error(importer, setting, raw, "期望布尔值")),
    }
}

/// 解析秒数配置
fn parse_seconds(importer: &str, setting: &str, raw: &str) -> ImportResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| config_error(importer, setting, raw, &e.to_string()))
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    use crate::domain::types::CacheStage;

    /// 导入器配置键前缀
    pub const IMPORT_PREFIX: &str = "import";

    // 源数据缓存
    pub const SOURCE_CACHE_ENABLED: &str = "source_cache/enabled";
    pub const SOURCE_CACHE_PREFIX: &str = "source_cache/prefix";
    pub const SOURCE_CACHE_EXPIRY_SECONDS: &str = "source_cache/expiry_seconds";
    pub const SOURCE_CACHE_EXPIRES_AT: &str = "source_cache/expires_at";

    // 转换数据缓存
    pub const TRANSFORMED_CACHE_ENABLED: &str = "transformed_cache/enabled";
    pub const TRANSFORMED_CACHE_PREFIX: &str = "transformed_cache/prefix";
    pub const TRANSFORMED_CACHE_EXPIRY_SECONDS: &str = "transformed_cache/expiry_seconds";
    pub const TRANSFORMED_CACHE_EXPIRES_AT: &str = "transformed_cache/expires_at";

    // 试运行
    pub const TEST: &str = "test";

    // 属性规则
    pub const ALLOW_AUTO_CREATE_OPTIONS: &str = "allow_auto_create_options";
    pub const WARN_ON_UNKNOWN_FIELDS: &str = "warn_on_unknown_fields";
    pub const PRICE_SCOPE_GLOBAL: &str = "price_scope_global";

    /// 某缓存阶段的配置项名
    pub struct StageKeys {
        pub enabled: &'static str,
        pub prefix: &'static str,
        pub expiry_seconds: &'static str,
        pub expires_at: &'static str,
    }

    pub fn stage_keys(stage: CacheStage) -> StageKeys {
        match stage {
            CacheStage::Source => StageKeys {
                enabled: SOURCE_CACHE_ENABLED,
                prefix: SOURCE_CACHE_PREFIX,
                expiry_seconds: SOURCE_CACHE_EXPIRY_SECONDS,
                expires_at: SOURCE_CACHE_EXPIRES_AT,
            },
            CacheStage::Transformed => StageKeys {
                enabled: TRANSFORMED_CACHE_ENABLED,
                prefix: TRANSFORMED_CACHE_PREFIX,
                expiry_seconds: TRANSFORMED_CACHE_EXPIRY_SECONDS,
                expires_at: TRANSFORMED_CACHE_EXPIRES_AT,
            },
        }
    }

    /// 完整键: import/<导入器>/<配置项>
    pub fn import_key(importer: &str, setting: &str) -> String {
        format!("{}/{}/{}", IMPORT_PREFIX, importer, setting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::install_config_schema;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        install_config_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_missing_keys_keep_defaults() {
        let config = manager().load_import_config("products").unwrap();
        assert_eq!(config, ImportConfig::for_importer("products"));
    }

    #[test]
    fn test_overrides_are_scoped_to_importer() {
        let manager = manager();
        manager.set_import_setting("products", config_keys::TEST, "1").unwrap();
        manager
            .set_import_setting("products", config_keys::SOURCE_CACHE_EXPIRY_SECONDS, "120")
            .unwrap();
        manager
            .set_import_setting("categories", config_keys::WARN_ON_UNKNOWN_FIELDS, "true")
            .unwrap();

        let config = manager.load_import_config("products").unwrap();
        assert!(config.test);
        assert_eq!(config.source_cache.expiry, CacheExpiry::Seconds(120));
        assert_eq!(config.transformed_cache.expiry, CacheExpiry::Default);
        assert!(!config.attribute_rules.warn_on_unknown_fields);
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let manager = manager();
        manager
            .set_import_setting("products", config_keys::TRANSFORMED_CACHE_ENABLED, "maybe")
            .unwrap();

        let err = manager.load_import_config("products").unwrap_err();
        assert!(matches!(err, ImportError::Config { .. }));
        assert!(err.is_fatal());
    }
}
