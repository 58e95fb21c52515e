// ==========================================
// 批量导入管线 - 领域类型定义
// ==========================================
// 职责: 严重级别 / 缓存阶段 / 作用域 / 后端存储类型 / 特殊字段类型
// 序列化格式: 与数据库及配置一致（小写字符串）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 严重级别 (Severity)
// ==========================================
// 每条无效原因携带一个级别，仅用于展示，不影响剔除逻辑
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,   // 错误
    Warning, // 警告
    Notice,  // 提示
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Notice => write!(f, "notice"),
        }
    }
}

// ==========================================
// 缓存阶段 (Cache Stage)
// ==========================================
// 两个阶段契约相同，物理表与分块大小不同
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStage {
    Source,      // 源数据缓存
    Transformed, // 转换数据缓存
}

impl CacheStage {
    /// 对应的缓存表名
    pub fn table_name(&self) -> &'static str {
        match self {
            CacheStage::Source => "import_source_cache",
            CacheStage::Transformed => "import_transformed_cache",
        }
    }

    /// 批量查询时每块的键数量上限
    pub fn lookup_chunk_size(&self) -> usize {
        match self {
            CacheStage::Source => 2500,
            CacheStage::Transformed => 1000,
        }
    }
}

impl fmt::Display for CacheStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStage::Source => write!(f, "source"),
            CacheStage::Transformed => write!(f, "transformed"),
        }
    }
}

impl FromStr for CacheStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(CacheStage::Source),
            "transformed" => Ok(CacheStage::Transformed),
            other => Err(format!("未知缓存阶段: {}", other)),
        }
    }
}

// ==========================================
// 字段作用域 (Field Scope)
// ==========================================
// 仅对支持门店覆写的实体类型有意义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldScope {
    Global,  // 全局
    Website, // 网站（门店组）
    Store,   // 单门店
}

impl fmt::Display for FieldScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldScope::Global => write!(f, "global"),
            FieldScope::Website => write!(f, "website"),
            FieldScope::Store => write!(f, "store"),
        }
    }
}

// ==========================================
// 存储方式 (Storage Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Static,  // 实体主表固定列
    Dynamic, // 属性值表（EAV）
}

// ==========================================
// 后端存储类型 (Backend Type)
// ==========================================
// 校验器按此类型分派，Other 保留未知类型名，走宽松默认分支
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Varchar,
    Text,
    MediumText,
    LongText,
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    Decimal,
    Date,
    Datetime,
    Timestamp,
    Select,
    MultiSelect,
    Other(String),
}

impl BackendType {
    /// 从数据库/元数据类型名解析（不区分大小写）
    pub fn from_db_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "varchar" => BackendType::Varchar,
            "text" => BackendType::Text,
            "mediumtext" => BackendType::MediumText,
            "longtext" => BackendType::LongText,
            "tinyint" => BackendType::TinyInt,
            "smallint" => BackendType::SmallInt,
            "mediumint" => BackendType::MediumInt,
            "int" | "integer" => BackendType::Int,
            "bigint" => BackendType::BigInt,
            "decimal" => BackendType::Decimal,
            "date" => BackendType::Date,
            "datetime" => BackendType::Datetime,
            "timestamp" => BackendType::Timestamp,
            "select" => BackendType::Select,
            "multiselect" => BackendType::MultiSelect,
            other => BackendType::Other(other.to_string()),
        }
    }

    pub fn to_db_str(&self) -> &str {
        match self {
            BackendType::Varchar => "varchar",
            BackendType::Text => "text",
            BackendType::MediumText => "mediumtext",
            BackendType::LongText => "longtext",
            BackendType::TinyInt => "tinyint",
            BackendType::SmallInt => "smallint",
            BackendType::MediumInt => "mediumint",
            BackendType::Int => "int",
            BackendType::BigInt => "bigint",
            BackendType::Decimal => "decimal",
            BackendType::Date => "date",
            BackendType::Datetime => "datetime",
            BackendType::Timestamp => "timestamp",
            BackendType::Select => "select",
            BackendType::MultiSelect => "multiselect",
            BackendType::Other(name) => name.as_str(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            BackendType::TinyInt
                | BackendType::SmallInt
                | BackendType::MediumInt
                | BackendType::Int
                | BackendType::BigInt
        )
    }

    pub fn is_date_like(&self) -> bool {
        matches!(
            self,
            BackendType::Date | BackendType::Datetime | BackendType::Timestamp
        )
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 特殊字段类型 (Special Kind)
// ==========================================
// 调用方提供的 {字段: 基础类型} 覆盖表，绕过实体元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialKind {
    Int,
    String,
    Date,
    Datetime,
}

impl fmt::Display for SpecialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecialKind::Int => write!(f, "int"),
            SpecialKind::String => write!(f, "string"),
            SpecialKind::Date => write!(f, "date"),
            SpecialKind::Datetime => write!(f, "datetime"),
        }
    }
}

impl FromStr for SpecialKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "int" => Ok(SpecialKind::Int),
            "string" => Ok(SpecialKind::String),
            "date" => Ok(SpecialKind::Date),
            "datetime" => Ok(SpecialKind::Datetime),
            other => Err(format!("未知特殊字段类型: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_roundtrip_names() {
        assert_eq!(BackendType::from_db_str("VARCHAR"), BackendType::Varchar);
        assert_eq!(BackendType::from_db_str("integer"), BackendType::Int);
        assert_eq!(
            BackendType::from_db_str("gallery"),
            BackendType::Other("gallery".to_string())
        );
        assert_eq!(BackendType::MultiSelect.to_db_str(), "multiselect");
    }

    #[test]
    fn test_cache_stage_chunk_sizes() {
        assert_eq!(CacheStage::Source.lookup_chunk_size(), 2500);
        assert_eq!(CacheStage::Transformed.lookup_chunk_size(), 1000);
        assert_eq!("Transformed".parse::<CacheStage>(), Ok(CacheStage::Transformed));
    }

    #[test]
    fn test_special_kind_parse() {
        assert_eq!("int".parse::<SpecialKind>(), Ok(SpecialKind::Int));
        assert!("float".parse::<SpecialKind>().is_err());
    }
}
