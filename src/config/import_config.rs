// ==========================================
// 批量导入管线 - 导入配置
// ==========================================
// 职责: 单个导入器的运行配置（缓存阶段 / 试运行 / 属性规则）
// 来源: 默认值 + config_kv 覆写（见 ConfigManager）
// ==========================================

use crate::domain::types::CacheStage;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// 秒数过期上限（100 年），防止时间溢出
const MAX_EXPIRY_SECONDS: u64 = 100 * 365 * 24 * 3600;

// ==========================================
// CacheExpiry - 缓存过期策略
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum CacheExpiry {
    Default,            // 保存时刻起一年
    Seconds(u64),       // 保存时刻起 N 秒
    At(DateTime<Utc>),  // 绝对时刻
}

impl Default for CacheExpiry {
    fn default() -> Self {
        CacheExpiry::Default
    }
}

impl CacheExpiry {
    /// 计算过期时刻
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            CacheExpiry::Default => now
                .checked_add_months(Months::new(12))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            CacheExpiry::Seconds(seconds) => {
                let seconds = (*seconds).min(MAX_EXPIRY_SECONDS) as i64;
                now.checked_add_signed(Duration::seconds(seconds))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
            CacheExpiry::At(at) => *at,
        }
    }
}

// ==========================================
// CacheStageConfig - 单个缓存阶段配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheStageConfig {
    pub enabled: bool,       // 是否启用
    pub prefix: String,      // 命名空间
    pub expiry: CacheExpiry, // 过期策略
}

impl Default for CacheStageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: String::new(),
            expiry: CacheExpiry::Default,
        }
    }
}

// ==========================================
// AttributeRules - 属性校验规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeRules {
    pub allow_auto_create_options: bool, // 自动创建缺失选项
    pub warn_on_unknown_fields: bool,    // 未知字段仅告警
    pub price_scope_global: bool,        // 价格类字段强制全局作用域
}

impl Default for AttributeRules {
    fn default() -> Self {
        Self {
            allow_auto_create_options: true,
            warn_on_unknown_fields: false,
            price_scope_global: false,
        }
    }
}

// ==========================================
// ImportConfig - 导入器配置
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub importer: String,                  // 导入器名称
    pub source_cache: CacheStageConfig,    // 源数据缓存
    pub transformed_cache: CacheStageConfig, // 转换数据缓存
    pub test: bool,                        // 试运行（不写缓存）
    pub attribute_rules: AttributeRules,   // 属性校验规则
}

impl ImportConfig {
    /// 以导入器名称作为两个缓存阶段的默认命名空间
    pub fn for_importer(importer: &str) -> Self {
        let stage = CacheStageConfig {
            prefix: importer.to_string(),
            ..CacheStageConfig::default()
        };
        Self {
            importer: importer.to_string(),
            source_cache: stage.clone(),
            transformed_cache: stage,
            ..Self::default()
        }
    }

    pub fn cache(&self, stage: CacheStage) -> &CacheStageConfig {
        match stage {
            CacheStage::Source => &self.source_cache,
            CacheStage::Transformed => &self.transformed_cache,
        }
    }

    pub fn cache_mut(&mut self, stage: CacheStage) -> &mut CacheStageConfig {
        match stage {
            CacheStage::Source => &mut self.source_cache,
            CacheStage::Transformed => &mut self.transformed_cache,
        }
    }
}
