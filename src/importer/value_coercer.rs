// ==========================================
// 批量导入管线 - 值规整
// ==========================================
// 职责: 原始值 → 目标列可存储的表示
// - 空日期 → null
// - decimal → 四位小数
// - 其余按物理列类型/宽度转换
// ==========================================

use crate::domain::attribute::{ColumnDescriptor, FieldDescriptor};
use crate::domain::element::scalar_to_string;
use crate::domain::types::{BackendType, SpecialKind};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::hashing::canonical_json;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};

/// decimal 字段保留的小数位
pub const DECIMAL_PLACES: u32 = 4;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_PATTERNS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_PATTERNS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y", "%Y%m%d"];

/// 解析常见日期/时间写法
pub fn parse_date_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }

    DATETIME_PATTERNS
        .iter()
        .find_map(|p| NaiveDateTime::parse_from_str(raw, p).ok())
        .or_else(|| {
            DATE_PATTERNS
                .iter()
                .find_map(|p| NaiveDate::parse_from_str(raw, p).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// 整数强转: 取前导整数部分，无数字时为 0
pub fn int_cast(raw: &str) -> i64 {
    let s = raw.trim();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut acc: i64 = 0;
    for b in digits.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        acc = acc.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }

    if negative {
        -acc
    } else {
        acc
    }
}

/// 清理字符串: 去除控制字符（保留制表/换行/回车）
pub fn clean_string(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// 四舍五入到指定小数位
pub fn round_decimal(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// 空值判定: null / 空串 / "0" / 0 / false / 空数组
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

fn is_float_type(name: &str) -> bool {
    matches!(name, "float" | "double" | "real" | "numeric")
}

/// 按字段类型规整待写入的值
///
/// # 说明
/// - 固定列使用物理列类型，动态属性使用字段声明类型
pub fn prepare_value(field: &FieldDescriptor, column: &ColumnDescriptor, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    let backend_type = if field.is_static() {
        column.backend_type()
    } else {
        field.backend_type.clone()
    };

    if backend_type.is_date_like() && is_empty_value(value) {
        return Value::Null;
    }

    if backend_type == BackendType::Decimal {
        if let Some(parsed) = scalar_to_string(value).and_then(|s| s.trim().parse::<f64>().ok()) {
            return float_value(round_decimal(parsed, DECIMAL_PLACES));
        }
    }

    prepare_column_value(column, value)
}

/// 按物理列类型/宽度转换
pub fn prepare_column_value(column: &ColumnDescriptor, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    let Some(raw) = scalar_to_string(value) else {
        return value.clone();
    };

    let backend_type = column.backend_type();
    let is_text = matches!(
        backend_type,
        BackendType::Varchar | BackendType::Text | BackendType::MediumText | BackendType::LongText
    );

    if column.nullable && !is_text && raw.trim().is_empty() {
        return Value::Null;
    }

    match backend_type {
        t if t.is_integer() => Value::from(int_cast(&raw)),
        BackendType::Decimal => {
            let parsed = raw.trim().parse::<f64>().unwrap_or(0.0);
            float_value(round_decimal(parsed, column.scale.unwrap_or(DECIMAL_PLACES)))
        }
        BackendType::Other(ref name) if is_float_type(name) => {
            float_value(raw.trim().parse::<f64>().unwrap_or(0.0))
        }
        BackendType::Date => Value::String(
            parse_date_time(&raw)
                .map(|dt| dt.format(DATE_FORMAT).to_string())
                .unwrap_or(raw),
        ),
        BackendType::Datetime | BackendType::Timestamp => Value::String(
            parse_date_time(&raw)
                .map(|dt| dt.format(DATETIME_FORMAT).to_string())
                .unwrap_or(raw),
        ),
        BackendType::Varchar => match column.length {
            Some(length) => Value::String(raw.chars().take(length as usize).collect()),
            None => Value::String(raw),
        },
        BackendType::Text | BackendType::MediumText | BackendType::LongText => Value::String(raw),
        _ => value.clone(),
    }
}

/// 特殊字段值规整
///
/// 未知类型属于配置错误，返回致命错误
pub fn prepare_special_value(kind: &str, value: &Value) -> ImportResult<Value> {
    let kind: SpecialKind = kind
        .parse()
        .map_err(|_| ImportError::UnsupportedSpecialKind(kind.to_string()))?;

    let text = scalar_to_string(value).unwrap_or_else(|| canonical_json(value));

    let prepared = match kind {
        SpecialKind::Int => Value::from(int_cast(&text)),
        SpecialKind::String => Value::String(text),
        SpecialKind::Date => Value::String(
            parse_date_time(&text)
                .map(|dt| dt.format(DATE_FORMAT).to_string())
                .unwrap_or(text),
        ),
        SpecialKind::Datetime => Value::String(
            parse_date_time(&text)
                .map(|dt| dt.format(DATETIME_FORMAT).to_string())
                .unwrap_or(text),
        ),
    };

    Ok(prepared)
}
