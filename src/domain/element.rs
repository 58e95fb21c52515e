// ==========================================
// 批量导入管线 - 元素模型
// ==========================================
// 职责: 定义管线中流转的记录（源元素 / 转换元素）及无效原因
// 约束: 元素编号在一次运行、同一阶段内唯一且稳定
// ==========================================

use crate::domain::types::Severity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 元素编号（批次内位置，运行期间稳定）
pub type ElementNumber = usize;

/// 元素: 字段名 → 值 的映射
pub type Element = Map<String, Value>;

/// 按编号排序的元素集合
pub type ElementMap = BTreeMap<ElementNumber, Element>;

// ==========================================
// InvalidReason - 元素无效原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidReason {
    pub reason: String,     // 原因描述
    pub severity: Severity, // 严重级别
}

impl InvalidReason {
    pub fn new(reason: impl Into<String>, severity: Severity) -> Self {
        Self {
            reason: reason.into(),
            severity,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(reason, Severity::Error)
    }
}

// ==========================================
// SourceTransformedRelation - 源 → 转换 关系
// ==========================================
// 多对多: 一个源元素可产生多个转换元素，反之亦然
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceTransformedRelation {
    pub source: ElementNumber,
    pub transformed: ElementNumber,
}

/// 标量值转字符串（null → 空串，数组/对象 → None）
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some(String::new()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(&json!(null)), Some(String::new()));
        assert_eq!(scalar_to_string(&json!(true)), Some("1".to_string()));
        assert_eq!(scalar_to_string(&json!(3.5)), Some("3.5".to_string()));
        assert_eq!(scalar_to_string(&json!(" abc ")), Some(" abc ".to_string()));
        assert_eq!(scalar_to_string(&json!([1, 2])), None);
        assert_eq!(scalar_to_string(&json!({"a": 1})), None);
    }
}
