// ==========================================
// 批量导入管线 - 属性值校验器
// ==========================================
// 职责: 判定原始值对目标字段是否可接受；按需自动创建缺失的枚举选项
// 流程: 形态检查 → 记忆命中 → 特殊字段 → 元数据解析 → 按后端类型分派
// 约束: 记忆表仅在单个校验器实例内有效，跨运行需 reset()
// ==========================================

use crate::config::ImportConfig;
use crate::domain::attribute::FieldDescriptor;
use crate::domain::element::{scalar_to_string, Element};
use crate::domain::types::{BackendType, SpecialKind};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::hashing::validation_memo_key;
use crate::importer::metadata::{ColumnCatalog, EntityMetadataProvider};
use crate::importer::value_coercer::{clean_string, int_cast, parse_date_time};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// varchar 长度上限（不含）
pub const VARCHAR_MAX_LENGTH: u64 = 255;
/// text 长度上限（不含）
pub const TEXT_MAX_LENGTH: u64 = 65_536;
/// mediumtext 长度上限（不含）
pub const MEDIUMTEXT_MAX_LENGTH: u64 = 16_777_215;
/// longtext 长度上限（不含）
pub const LONGTEXT_MAX_LENGTH: u64 = 4_294_967_295;

/// 宽松日期写法: dd.mm.yy[yy][ hh:mm[:ss]]
static LOOSE_DATE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^\d{2}.\d{2}.\d{2,4}(?:\s+\d{1,2}.\d{1,2}(?:.\d{1,2})?)?$").ok()
});

/// 特殊字段覆盖表: 字段代码 → 基础类型名（int / string / date / datetime）
pub type SpecialFields = BTreeMap<String, String>;

// ==========================================
// ValidationOptions - 校验选项
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOptions {
    pub allow_auto_create_options: bool, // 允许自动创建缺失选项
    pub warn_on_unknown_fields: bool,    // 未知字段仅告警并忽略
    pub special_fields: SpecialFields,   // 特殊字段覆盖表
    pub test: bool,                      // 试运行（选项创建不落库）
}

impl ValidationOptions {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            allow_auto_create_options: config.attribute_rules.allow_auto_create_options,
            warn_on_unknown_fields: config.attribute_rules.warn_on_unknown_fields,
            special_fields: SpecialFields::new(),
            test: config.test,
        }
    }

    pub fn with_special_field(mut self, code: &str, kind: &str) -> Self {
        self.special_fields.insert(code.to_string(), kind.to_string());
        self
    }
}

// ==========================================
// AttributeValidator - 属性值校验器
// ==========================================
pub struct AttributeValidator {
    metadata: Arc<dyn EntityMetadataProvider>,
    columns: ColumnCatalog,
    memo: HashMap<String, bool>,
}

impl AttributeValidator {
    /// 使用 SQLite 表结构探查创建校验器
    pub fn new(metadata: Arc<dyn EntityMetadataProvider>) -> Self {
        Self::with_column_catalog(metadata, ColumnCatalog::sqlite())
    }

    pub fn with_column_catalog(metadata: Arc<dyn EntityMetadataProvider>, columns: ColumnCatalog) -> Self {
        Self {
            metadata,
            columns,
            memo: HashMap::new(),
        }
    }

    /// 清空记忆表与表结构缓存
    pub fn reset(&mut self) {
        self.memo.clear();
        self.columns.clear();
    }

    /// 已记忆的 (字段, 值) 数量
    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    /// 校验单个字段值
    ///
    /// # 返回
    /// - Ok(()): 值可接受
    /// - Err(UnknownField { ignorable: true }): 字段未知且仅告警，调用方应移除该字段
    /// - Err(其他元素级错误): 值不可接受
    /// - Err(致命错误): 基础设施故障
    pub fn validate(
        &mut self,
        conn: &Connection,
        entity_type: &str,
        code: &str,
        value: &Value,
        store_id: i64,
        options: &ValidationOptions,
    ) -> ImportResult<()> {
        if matches!(value, Value::Array(_) | Value::Object(_)) {
            return Err(ImportError::InvalidShape {
                field: code.to_string(),
            });
        }

        let memo_key = validation_memo_key(code, value);
        if let Some(valid) = self.memo.get(&memo_key) {
            return if *valid {
                Ok(())
            } else {
                Err(invalid_value(code, value))
            };
        }

        let outcome = self.evaluate(conn, entity_type, code, value, store_id, options);

        match &outcome {
            Ok(()) => {
                self.memo.insert(memo_key, true);
            }
            // 未知字段与基础设施错误不记忆
            Err(ImportError::UnknownField { .. }) => {}
            Err(err) if err.is_fatal() => {}
            Err(_) => {
                self.memo.insert(memo_key, false);
            }
        }

        outcome
    }

    /// 校验元素的全部字段
    ///
    /// 可忽略的未知字段会从元素中移除；返回其余字段的错误
    pub fn validate_element(
        &mut self,
        conn: &Connection,
        entity_type: &str,
        element: &mut Element,
        store_id: i64,
        options: &ValidationOptions,
    ) -> ImportResult<Vec<(String, ImportError)>> {
        let codes: Vec<String> = element.keys().cloned().collect();
        let mut errors = Vec::new();

        for code in codes {
            let Some(value) = element.get(&code).cloned() else {
                continue;
            };

            match self.validate(conn, entity_type, &code, &value, store_id, options) {
                Ok(()) => {}
                Err(err) if err.should_ignore_field() => {
                    element.remove(&code);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => errors.push((code, err)),
            }
        }

        Ok(errors)
    }

    fn evaluate(
        &mut self,
        conn: &Connection,
        entity_type: &str,
        code: &str,
        value: &Value,
        store_id: i64,
        options: &ValidationOptions,
    ) -> ImportResult<()> {
        if let Some(kind) = options.special_fields.get(code) {
            return if is_special_value_valid(kind, value) {
                Ok(())
            } else {
                Err(ImportError::InvalidSpecialValue {
                    field: code.to_string(),
                    kind: kind.clone(),
                    value: display_value(value),
                })
            };
        }

        let Some(field) = self.metadata.field(entity_type, code) else {
            if options.warn_on_unknown_fields {
                warn!(entity_type, field = code, "未知字段，已忽略");
            }
            return Err(ImportError::UnknownField {
                entity_type: entity_type.to_string(),
                field: code.to_string(),
                ignorable: options.warn_on_unknown_fields,
            });
        };

        if field.is_static() {
            let column = self
                .columns
                .column(conn, &field.table, code)?
                .ok_or_else(|| ImportError::SchemaResolution {
                    table: field.table.clone(),
                    column: code.to_string(),
                })?;
            return self.check_type(conn, &field, &column.backend_type(), value, store_id, options);
        }

        if value.is_null() {
            let column = self.columns.value_column(conn, &field.table, code)?;
            if column.nullable {
                return Ok(());
            }
        }

        let backend_type = field.backend_type.clone();
        self.check_type(conn, &field, &backend_type, value, store_id, options)
    }

    fn check_type(
        &self,
        conn: &Connection,
        field: &FieldDescriptor,
        backend_type: &BackendType,
        value: &Value,
        store_id: i64,
        options: &ValidationOptions,
    ) -> ImportResult<()> {
        let text = scalar_to_string(value).unwrap_or_default();

        let valid = match backend_type {
            BackendType::Varchar => length_below(&text, VARCHAR_MAX_LENGTH),
            BackendType::Text => length_below(&text, TEXT_MAX_LENGTH),
            BackendType::MediumText => length_below(&text, MEDIUMTEXT_MAX_LENGTH),
            BackendType::LongText => length_below(&text, LONGTEXT_MAX_LENGTH),
            BackendType::Decimal => value.is_null() || is_decimal_like(&text),
            t if t.is_integer() => value.is_null() || is_integer_like(&text),
            BackendType::Datetime => value.is_null() || is_datetime_like(&text),
            BackendType::Select => {
                let token = text.trim();
                return if token.is_empty() {
                    Ok(())
                } else {
                    self.check_option(conn, field, token, store_id, options)
                };
            }
            BackendType::MultiSelect => {
                // 每个选项独立校验（含自动创建），最后返回首个错误
                let mut first_error = None;
                for token in text.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    if let Err(err) = self.check_option(conn, field, token, store_id, options) {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
                return first_error.map_or(Ok(()), Err);
            }
            _ => true,
        };

        if valid {
            Ok(())
        } else {
            Err(invalid_value(&field.code, value))
        }
    }

    /// 枚举选项: 标签 → 数字 ID → 选项键 → 自动创建
    fn check_option(
        &self,
        conn: &Connection,
        field: &FieldDescriptor,
        token: &str,
        store_id: i64,
        options: &ValidationOptions,
    ) -> ImportResult<()> {
        if self.metadata.option_id_by_label(field, store_id, token).is_some() {
            return Ok(());
        }

        if let Ok(option_id) = token.parse::<i64>() {
            if self.metadata.has_option_id(field, option_id) {
                return Ok(());
            }
        }

        if self.metadata.has_option_key(field, token) {
            return Ok(());
        }

        if !options.allow_auto_create_options {
            debug!(field = %field.code, value = token, "选项不存在");
            return Err(ImportError::InvalidValue {
                field: field.code.clone(),
                value: token.to_string(),
            });
        }

        match self
            .metadata
            .add_option(conn, field, 0, store_id, token, options.test)
        {
            Ok(()) => {
                info!(field = %field.code, value = token, store_id, "已自动创建选项");
                Ok(())
            }
            Err(err) => {
                error!(field = %field.code, value = token, error = %err, "自动创建选项失败");
                Err(ImportError::OptionCreation {
                    field: field.code.clone(),
                    value: token.to_string(),
                    message: err.to_string(),
                })
            }
        }
    }
}

fn invalid_value(code: &str, value: &Value) -> ImportError {
    ImportError::InvalidValue {
        field: code.to_string(),
        value: display_value(value),
    }
}

fn display_value(value: &Value) -> String {
    let text = scalar_to_string(value).unwrap_or_else(|| value.to_string());
    if text.chars().count() > 64 {
        format!("{}…", text.chars().take(64).collect::<String>())
    } else {
        text
    }
}

fn length_below(text: &str, limit: u64) -> bool {
    count_below(clean_string(text).chars().count() as u64, limit)
}

fn count_below(count: u64, limit: u64) -> bool {
    count < limit
}

fn is_integer_like(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.parse::<i64>().is_ok() {
        return true;
    }
    trimmed
        .parse::<f64>()
        .map(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .unwrap_or(false)
}

fn is_decimal_like(text: &str) -> bool {
    text.trim()
        .parse::<f64>()
        .map(f64::is_finite)
        .unwrap_or(false)
}

fn is_datetime_like(text: &str) -> bool {
    parse_date_time(text).is_some()
        || LOOSE_DATE
            .as_ref()
            .map_or(false, |re| re.is_match(text.trim()))
}

/// 特殊字段规则: int 需等于其整数转换；string 接受字符串或数字；其他类型无效
fn is_special_value_valid(kind: &str, value: &Value) -> bool {
    let Ok(kind) = kind.parse::<SpecialKind>() else {
        return false;
    };

    match kind {
        SpecialKind::Int => match value {
            Value::Null => false,
            _ => scalar_to_string(value)
                .map(|text| int_cast(&text).to_string() == text.trim() || is_integer_like(&text))
                .unwrap_or(false),
        },
        SpecialKind::String => matches!(value, Value::String(_) | Value::Number(_)),
        // 日期类仅用于写入规整，校验一律不通过
        SpecialKind::Date | SpecialKind::Datetime => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_like() {
        assert!(is_integer_like("42"));
        assert!(is_integer_like(" -3 "));
        assert!(is_integer_like("5.0"));
        assert!(!is_integer_like("5.5"));
        assert!(!is_integer_like("5abc"));
        assert!(!is_integer_like(""));
    }

    #[test]
    fn test_datetime_like() {
        assert!(is_datetime_like("2026-01-02 10:00:00"));
        assert!(is_datetime_like("31.12.99"));
        assert!(is_datetime_like("31.12.2026 7:05"));
        assert!(!is_datetime_like("tomorrow-ish"));
        assert!(!is_datetime_like(""));
    }

    #[test]
    fn test_special_value_rules() {
        assert!(is_special_value_valid("int", &json!("15")));
        assert!(is_special_value_valid("int", &json!(15)));
        assert!(!is_special_value_valid("int", &json!("15a")));
        assert!(!is_special_value_valid("int", &json!(null)));
        assert!(is_special_value_valid("string", &json!(1.5)));
        assert!(!is_special_value_valid("string", &json!(true)));
        assert!(!is_special_value_valid("date", &json!("2026-01-01")));
        assert!(!is_special_value_valid("datetime", &json!(null)));
        assert!(!is_special_value_valid("float", &json!(1.5)));
    }

    #[test]
    fn test_length_tier_boundaries() {
        assert!(length_below(&"a".repeat(254), VARCHAR_MAX_LENGTH));
        assert!(!length_below(&"a".repeat(255), VARCHAR_MAX_LENGTH));
        assert!(length_below(&"a".repeat(65_535), TEXT_MAX_LENGTH));
        assert!(!length_below(&"a".repeat(65_536), TEXT_MAX_LENGTH));

        assert!(count_below(16_777_214, MEDIUMTEXT_MAX_LENGTH));
        assert!(!count_below(16_777_215, MEDIUMTEXT_MAX_LENGTH));
        assert!(count_below(4_294_967_294, LONGTEXT_MAX_LENGTH));
        assert!(!count_below(4_294_967_295, LONGTEXT_MAX_LENGTH));
    }

    #[test]
    fn test_length_counts_chars_after_cleaning() {
        let text = format!("{}\u{0007}", "é".repeat(254));
        assert!(length_below(&text, VARCHAR_MAX_LENGTH));
    }
}
