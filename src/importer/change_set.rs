// ==========================================
// 批量导入管线 - 变更指令构建器
// ==========================================
// 职责: 字段 + 值 → 单行写入 / 属性表写入（含门店展开与默认作用域值）
// 核心矩阵（门店感知实体的动态字段）:
// - 门店写入: 请求门店 ≠ 0 且 作用域 ≠ 全局 且 调用方要求门店值
// - 默认写入: 请求门店 = 0 或 调用方要求默认值 或 作用域 = 全局
// ==========================================

use crate::domain::attribute::{
    is_scope_aware_entity, ChangeInstruction, FieldDescriptor, DEFAULT_STORE_ID, PRICE_FIELD_CODES,
};
use crate::domain::element::Element;
use crate::domain::types::FieldScope;
use crate::importer::attribute_validator::SpecialFields;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::metadata::{ColumnCatalog, EntityMetadataProvider};
use crate::importer::value_coercer::{prepare_special_value, prepare_value};
use rusqlite::Connection;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// ChangeSetOptions - 构建选项
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ChangeSetOptions {
    pub ignored_fields: BTreeSet<String>, // 不生成任何指令的字段
    pub special_fields: SpecialFields,    // 特殊字段覆盖表
    pub default_values: Element,          // 默认作用域值覆盖（字段代码 → 值，原样写入）
    pub add_store_value: bool,            // 写入门店级值
    pub add_admin_value: bool,            // 写入默认作用域值
    pub add_empty_admin_value: bool,      // 默认作用域写 null
}

// ==========================================
// ChangeSetBuilder - 变更指令构建器
// ==========================================
pub struct ChangeSetBuilder {
    metadata: Arc<dyn EntityMetadataProvider>,
    columns: ColumnCatalog,
    price_scope_global: bool,
}

impl ChangeSetBuilder {
    pub fn new(metadata: Arc<dyn EntityMetadataProvider>, price_scope_global: bool) -> Self {
        Self::with_column_catalog(metadata, ColumnCatalog::sqlite(), price_scope_global)
    }

    pub fn with_column_catalog(
        metadata: Arc<dyn EntityMetadataProvider>,
        columns: ColumnCatalog,
        price_scope_global: bool,
    ) -> Self {
        Self {
            metadata,
            columns,
            price_scope_global,
        }
    }

    /// 清空表结构缓存
    pub fn reset(&mut self) {
        self.columns.clear();
    }

    /// 构建字段的写入指令
    ///
    /// # 参数
    /// - entity_type / code: 目标字段
    /// - value: 原始值（内部规整为可存储表示）
    /// - entity_id: 目标实体 ID
    /// - store_id: 请求的门店（0 = 默认作用域）
    #[allow(clippy::too_many_arguments)]
    #[instrument(level = "debug", skip(self, conn, value, options))]
    pub fn build(
        &mut self,
        conn: &Connection,
        entity_type: &str,
        code: &str,
        value: &Value,
        entity_id: i64,
        store_id: i64,
        options: &ChangeSetOptions,
    ) -> ImportResult<Vec<ChangeInstruction>> {
        if options.ignored_fields.contains(code) {
            return Ok(Vec::new());
        }

        if let Some(kind) = options.special_fields.get(code) {
            let table = self
                .metadata
                .entity_table(entity_type)
                .ok_or_else(|| ImportError::SchemaResolution {
                    table: entity_type.to_string(),
                    column: code.to_string(),
                })?;
            return Ok(vec![ChangeInstruction::Single {
                table,
                entity_id,
                column: code.to_string(),
                value: prepare_special_value(kind, value)?,
            }]);
        }

        let field = self
            .metadata
            .field(entity_type, code)
            .ok_or_else(|| ImportError::UnknownField {
                entity_type: entity_type.to_string(),
                field: code.to_string(),
                ignorable: false,
            })?;

        if field.is_static() {
            let column = self
                .columns
                .column(conn, &field.table, code)?
                .ok_or_else(|| ImportError::SchemaResolution {
                    table: field.table.clone(),
                    column: code.to_string(),
                })?;
            return Ok(vec![ChangeInstruction::Single {
                table: field.table.clone(),
                entity_id,
                column: code.to_string(),
                value: prepare_value(&field, &column, value),
            }]);
        }

        let column = self.columns.value_column(conn, &field.table, code)?;
        let prepared = prepare_value(&field, &column, value);

        if !is_scope_aware_entity(entity_type) {
            return Ok(vec![scoped(&field, entity_id, None, prepared)]);
        }

        let is_global = self.is_effectively_global(&field);
        let mut instructions = Vec::new();

        let update_store_values = store_id != DEFAULT_STORE_ID && !is_global && options.add_store_value;
        if update_store_values {
            let store_ids = if field.scope == FieldScope::Website {
                self.metadata.website_store_ids(store_id)
            } else {
                vec![store_id]
            };
            for id in store_ids {
                instructions.push(scoped(&field, entity_id, Some(id), prepared.clone()));
            }
        }

        let update_admin_value = store_id == DEFAULT_STORE_ID || options.add_admin_value || is_global;
        if update_admin_value {
            let admin_value = if is_global {
                prepared
            } else if let Some(default_value) = options.default_values.get(code) {
                default_value.clone()
            } else if options.add_empty_admin_value {
                Value::Null
            } else {
                prepared
            };
            instructions.push(scoped(&field, entity_id, Some(DEFAULT_STORE_ID), admin_value));
        }

        Ok(instructions)
    }

    /// 价格类字段在全局价格策略下强制全局作用域
    fn is_effectively_global(&self, field: &FieldDescriptor) -> bool {
        if self.price_scope_global && PRICE_FIELD_CODES.contains(&field.code.as_str()) {
            return true;
        }
        self.metadata.is_global_field(field)
    }
}

fn scoped(field: &FieldDescriptor, entity_id: i64, store_id: Option<i64>, value: Value) -> ChangeInstruction {
    ChangeInstruction::Scoped {
        table: field.table.clone(),
        entity_id,
        field_id: field.field_id,
        store_id,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BackendType, StorageKind};
    use crate::importer::metadata::InMemoryEntityMetadata;
    use serde_json::json;

    fn setup() -> (Connection, ChangeSetBuilder) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE customer_varchar (entity_id INTEGER, attribute_id INTEGER, value VARCHAR(255));",
        )
        .unwrap();

        let metadata = InMemoryEntityMetadata::new().with_field(FieldDescriptor {
            entity_type: "customer".to_string(),
            code: "nickname".to_string(),
            field_id: 11,
            storage: StorageKind::Dynamic,
            backend_type: BackendType::Varchar,
            table: "customer_varchar".to_string(),
            scope: FieldScope::Store,
        });

        (conn, ChangeSetBuilder::new(Arc::new(metadata), false))
    }

    #[test]
    fn test_non_scope_aware_entity_yields_single_unscoped_row() {
        let (conn, mut builder) = setup();
        let options = ChangeSetOptions {
            add_store_value: true,
            add_admin_value: true,
            ..Default::default()
        };

        let rows = builder
            .build(&conn, "customer", "nickname", &json!("neo"), 7, 3, &options)
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].store_id(), None);
        assert_eq!(rows[0].value(), &json!("neo"));
    }

    #[test]
    fn test_unknown_field_is_error() {
        let (conn, mut builder) = setup();
        let result = builder.build(
            &conn,
            "customer",
            "missing",
            &json!(1),
            1,
            0,
            &ChangeSetOptions::default(),
        );
        assert!(matches!(result, Err(ImportError::UnknownField { .. })));
    }
}
