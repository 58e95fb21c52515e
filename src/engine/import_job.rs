// ==========================================
// 批量导入管线 - 导入作业 Trait
// ==========================================
// 职责: 编排器在各阶段调用的领域钩子（读取 / 校验 / 转换 / 导入 / 展示）
// 实现者: 具体导入器
// ==========================================

use crate::domain::element::{Element, ElementMap, ElementNumber, InvalidReason};
use crate::engine::run_context::{ImportTally, InvalidElements, TransformSink};
use crate::importer::error::ImportResult;
use crate::importer::hashing::element_digest;
use rusqlite::{Connection, Transaction};
use tracing::warn;

fn join_reasons(reasons: &[InvalidReason]) -> String {
    reasons
        .iter()
        .map(|r| format!("[{}] {}", r.severity, r.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

// ==========================================
// ImportJob Trait
// ==========================================
pub trait ImportJob {
    /// 日志中使用的元素名称（如 "products"）
    fn entities_log_name(&self) -> &str {
        "elements"
    }

    /// 运行前准备
    fn prepare(&mut self) -> ImportResult<()> {
        Ok(())
    }

    /// 读取源数据
    fn read_source_data(&mut self) -> ImportResult<ElementMap>;

    /// 校验源数据，将无效元素记入 invalid
    fn validate_source_data(&mut self, _data: &ElementMap, _invalid: &mut InvalidElements) -> ImportResult<()> {
        Ok(())
    }

    /// 源元素的缓存身份键（None / 空串 = 不参与缓存）
    fn source_hash_key(&self, number: ElementNumber, element: &Element) -> Option<String>;

    /// 源元素的内容摘要
    fn source_hash_value(&self, _number: ElementNumber, element: &Element) -> Option<String> {
        Some(element_digest(element))
    }

    /// 转换前处理剩余源元素（可修改/补充字段）
    fn prepare_source_data(&mut self, _remaining: &mut ElementMap) -> ImportResult<()> {
        Ok(())
    }

    /// 剩余源元素 → 转换元素；通过 sink 记录 源 → 转换 关系
    fn transform_data(&mut self, remaining: &ElementMap, sink: &mut TransformSink) -> ImportResult<()>;

    /// 校验转换数据（在目标库事务内执行）
    ///
    /// data 可被修改（例如移除可忽略的未知字段）
    fn validate_transformed_data(
        &mut self,
        _tx: &Transaction<'_>,
        _data: &mut ElementMap,
        _invalid: &mut InvalidElements,
    ) -> ImportResult<()> {
        Ok(())
    }

    /// 转换元素的缓存身份键
    fn transformed_hash_key(&self, number: ElementNumber, element: &Element) -> Option<String>;

    /// 转换元素的内容摘要
    fn transformed_hash_value(&self, _number: ElementNumber, element: &Element) -> Option<String> {
        Some(element_digest(element))
    }

    /// 导入剩余转换元素，并在 tally 中登记 imported / changed / unchanged
    fn import_transformed_data(
        &mut self,
        conn: &Connection,
        remaining: &ElementMap,
        tally: &mut ImportTally,
    ) -> ImportResult<()>;

    /// 展示无效源元素
    fn display_invalid_source_element(&self, number: ElementNumber, _element: &Element, reasons: &[InvalidReason]) {
        warn!(
            entities = self.entities_log_name(),
            element = number,
            reasons = %join_reasons(reasons),
            "源元素无效"
        );
    }

    /// 展示无效转换元素
    fn display_invalid_transformed_element(
        &self,
        number: ElementNumber,
        _element: &Element,
        reasons: &[InvalidReason],
    ) {
        warn!(
            entities = self.entities_log_name(),
            element = number,
            reasons = %join_reasons(reasons),
            "转换元素无效"
        );
    }

    /// 运行后清理（仅在运行未发生致命错误时调用）
    fn cleanup(&mut self) -> ImportResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Severity;

    #[test]
    fn test_join_reasons_keeps_order_and_severity() {
        let reasons = vec![
            InvalidReason::new("SKU 为空", Severity::Error),
            InvalidReason::new("价格被截断", Severity::Warning),
        ];
        assert_eq!(
            join_reasons(&reasons),
            "[error] SKU 为空; [warning] 价格被截断"
        );
        assert_eq!(join_reasons(&[]), "");
    }
}
