// ==========================================
// 批量导入管线 - 配置层
// ==========================================
// 职责: 导入器配置（默认值 + config_kv 覆写）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config;

// 重导出核心配置
pub use config_manager::{config_keys, ConfigManager};
pub use import_config::{AttributeRules, CacheExpiry, CacheStageConfig, ImportConfig};
