// ==========================================
// 批量导入管线 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 元素级错误（记录原因后剔除元素） / 基础设施错误（终止运行）
// ==========================================

use crate::domain::types::Severity;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 元素级错误（非致命） =====
    #[error("值形态无效 (字段 {field}): 仅接受标量或 null")]
    InvalidShape { field: String },

    #[error("未知字段 {field} (实体 {entity_type})")]
    UnknownField {
        entity_type: String,
        field: String,
        ignorable: bool,
    },

    #[error("字段值无效 (字段 {field}): {value}")]
    InvalidValue { field: String, value: String },

    #[error("特殊字段值无效 (字段 {field}, 类型 {kind}): {value}")]
    InvalidSpecialValue {
        field: String,
        kind: String,
        value: String,
    },

    #[error("不支持的特殊字段类型: {0}")]
    UnsupportedSpecialKind(String),

    #[error("无法识别字段类型 (表 {table}, 列 {column})")]
    SchemaResolution { table: String, column: String },

    #[error("选项创建失败 (字段 {field}, 值 {value}): {message}")]
    OptionCreation {
        field: String,
        value: String,
        message: String,
    },

    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFormat(String),

    #[error("源数据读取失败: {0}")]
    SourceRead(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParse(String),

    #[error("CSV 解析失败: {0}")]
    CsvParse(String),

    // ===== 数据库错误 =====
    #[error("数据库操作失败: {0}")]
    Database(String),

    #[error("数据库事务失败: {0}")]
    Transaction(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 配置错误 =====
    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    Config {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否为致命错误（终止整个运行）
    ///
    /// 元素级错误只影响单个元素，其余均视为基础设施错误
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ImportError::InvalidShape { .. }
                | ImportError::UnknownField { .. }
                | ImportError::InvalidValue { .. }
                | ImportError::InvalidSpecialValue { .. }
                | ImportError::SchemaResolution { .. }
                | ImportError::OptionCreation { .. }
        )
    }

    /// 元素级错误对应的严重级别
    pub fn severity(&self) -> Severity {
        if self.should_ignore_field() {
            Severity::Warning
        } else {
            Severity::Error
        }
    }

    /// "未知字段，跳过" 结果：调用方应移除该字段而非判定元素无效
    pub fn should_ignore_field(&self) -> bool {
        matches!(
            self,
            ImportError::UnknownField {
                ignorable: true,
                ..
            }
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::SourceRead(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Database(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParse(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParse(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
