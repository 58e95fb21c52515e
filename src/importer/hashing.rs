// ==========================================
// 批量导入管线 - 内容摘要
// ==========================================
// 职责: 元素规范化编码 + SHA-256 摘要（缓存 data_hash / 校验记忆键）
// 约束: 规范化编码跨版本固定，否则会导致缓存整体失效
// ==========================================

use crate::domain::element::Element;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// 规范化 JSON: 对象键递归排序，无多余空白
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// 元素的规范化 JSON
pub fn canonical_element(element: &Element) -> String {
    let mut out = String::new();
    write_object(element, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// 任意值的内容摘要
pub fn content_digest(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// 元素的内容摘要（缓存 data_hash 默认算法）
pub fn element_digest(element: &Element) -> String {
    sha256_hex(canonical_element(element).as_bytes())
}

/// 校验记忆键: 字段代码 + 分隔字节 + 值的规范化 JSON
pub fn validation_memo_key(code: &str, value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"y": [1, {"d": 2, "c": 3}], "x": null}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"x":null,"y":[1,{"c":3,"d":2}]},"b":1}"#
        );
    }

    #[test]
    fn test_element_digest_ignores_key_order() {
        let mut first = Element::new();
        first.insert("sku".to_string(), json!("A-1"));
        first.insert("qty".to_string(), json!(3));

        let mut second = Element::new();
        second.insert("qty".to_string(), json!(3));
        second.insert("sku".to_string(), json!("A-1"));

        assert_eq!(element_digest(&first), element_digest(&second));
        assert_eq!(element_digest(&first).len(), 64);

        second.insert("qty".to_string(), json!(4));
        assert_ne!(element_digest(&first), element_digest(&second));
    }

    #[test]
    fn test_memo_key_distinguishes_null_and_empty() {
        assert_ne!(
            validation_memo_key("name", &json!(null)),
            validation_memo_key("name", &json!(""))
        );
        assert_ne!(
            validation_memo_key("ab", &json!("c")),
            validation_memo_key("a", &json!("bc"))
        );
    }
}
