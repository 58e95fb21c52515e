// ==========================================
// 批量导入管线 - 实体元数据与表结构
// ==========================================
// 职责:
// - EntityMetadataProvider: 字段描述 / 选项值解析与创建 / 门店分组
// - SchemaIntrospector: 物理表列描述
// - ColumnCatalog: 单次运行内的表结构缓存
// 红线: 管线只依赖 Trait，不依赖具体元数据系统
// ==========================================

use crate::domain::attribute::{ColumnDescriptor, FieldDescriptor};
use crate::domain::types::FieldScope;
use crate::importer::error::{ImportError, ImportResult};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

// ==========================================
// EntityMetadataProvider Trait
// ==========================================
// 用途: 属性校验与变更指令构建所需的元数据接口
// 实现者: InMemoryEntityMetadata（嵌入式/测试）
pub trait EntityMetadataProvider: Send + Sync {
    /// 按 (实体类型, 字段代码) 解析字段
    fn field(&self, entity_type: &str, code: &str) -> Option<FieldDescriptor>;

    /// 实体主表名
    fn entity_table(&self, entity_type: &str) -> Option<String>;

    /// 按标签查找选项 ID（优先门店标签，其次默认标签）
    fn option_id_by_label(&self, field: &FieldDescriptor, store_id: i64, label: &str)
        -> Option<i64>;

    /// 选项 ID 是否存在
    fn has_option_id(&self, field: &FieldDescriptor, option_id: i64) -> bool;

    /// 选项键是否存在
    fn has_option_key(&self, field: &FieldDescriptor, key: &str) -> bool;

    /// 创建选项值
    ///
    /// # 参数
    /// - conn: 目标库连接（校验阶段处于事务内）
    /// - sort_order: 排序号（0 = 不指定）
    /// - test: 试运行，仅校验不落库
    fn add_option(
        &self,
        conn: &Connection,
        field: &FieldDescriptor,
        sort_order: i64,
        store_id: i64,
        value: &str,
        test: bool,
    ) -> ImportResult<()>;

    /// 与给定门店同属一个网站的全部门店 ID（含自身）
    fn website_store_ids(&self, store_id: i64) -> Vec<i64>;

    /// 字段是否为全局作用域
    fn is_global_field(&self, field: &FieldDescriptor) -> bool {
        field.scope == FieldScope::Global
    }
}

// ==========================================
// InMemoryEntityMetadata - 内存元数据
// ==========================================

/// 枚举选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionValue {
    pub option_id: i64,
    pub key: String,
    pub labels: BTreeMap<i64, String>, // 门店 ID → 标签（0 = 默认）
}

/// 一次选项创建尝试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionCreationAttempt {
    pub entity_type: String,
    pub code: String,
    pub store_id: i64,
    pub value: String,
    pub sort_order: i64,
    pub test: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryEntityMetadata {
    entity_tables: HashMap<String, String>,
    fields: HashMap<(String, String), FieldDescriptor>,
    options: Mutex<HashMap<(String, String), Vec<OptionValue>>>,
    websites: Vec<Vec<i64>>,
    attempts: Mutex<Vec<OptionCreationAttempt>>,
    reject_option_creation: bool,
}

impl InMemoryEntityMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity_table(mut self, entity_type: &str, table: &str) -> Self {
        self.entity_tables
            .insert(entity_type.to_string(), table.to_string());
        self
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields
            .insert((field.entity_type.clone(), field.code.clone()), field);
        self
    }

    /// 添加选项（标签为默认门店标签）
    pub fn with_option(self, entity_type: &str, code: &str, option_id: i64, key: &str, label: &str) -> Self {
        {
            let mut options = self.options.lock().unwrap_or_else(|p| p.into_inner());
            options
                .entry((entity_type.to_string(), code.to_string()))
                .or_default()
                .push(OptionValue {
                    option_id,
                    key: key.to_string(),
                    labels: BTreeMap::from([(0, label.to_string())]),
                });
        }
        self
    }

    /// 添加网站（门店分组）
    pub fn with_website(mut self, store_ids: Vec<i64>) -> Self {
        self.websites.push(store_ids);
        self
    }

    /// 选项创建一律失败（模拟元数据系统拒绝）
    pub fn with_rejected_option_creation(mut self) -> Self {
        self.reject_option_creation = true;
        self
    }

    /// 已发生的选项创建尝试
    pub fn option_creation_attempts(&self) -> Vec<OptionCreationAttempt> {
        self.attempts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn with_options<T>(&self, field: &FieldDescriptor, f: impl FnOnce(&[OptionValue]) -> T) -> T {
        let options = self.options.lock().unwrap_or_else(|p| p.into_inner());
        let key = (field.entity_type.clone(), field.code.clone());
        f(options.get(&key).map(Vec::as_slice).unwrap_or(&[]))
    }
}

impl EntityMetadataProvider for InMemoryEntityMetadata {
    fn field(&self, entity_type: &str, code: &str) -> Option<FieldDescriptor> {
        self.fields
            .get(&(entity_type.to_string(), code.to_string()))
            .cloned()
    }

    fn entity_table(&self, entity_type: &str) -> Option<String> {
        self.entity_tables.get(entity_type).cloned()
    }

    fn option_id_by_label(&self, field: &FieldDescriptor, store_id: i64, label: &str) -> Option<i64> {
        self.with_options(field, |options| {
            options
                .iter()
                .find(|o| o.labels.get(&store_id).map(String::as_str) == Some(label))
                .or_else(|| {
                    options
                        .iter()
                        .find(|o| o.labels.get(&0).map(String::as_str) == Some(label))
                })
                .map(|o| o.option_id)
        })
    }

    fn has_option_id(&self, field: &FieldDescriptor, option_id: i64) -> bool {
        self.with_options(field, |options| options.iter().any(|o| o.option_id == option_id))
    }

    fn has_option_key(&self, field: &FieldDescriptor, key: &str) -> bool {
        self.with_options(field, |options| options.iter().any(|o| o.key == key))
    }

    fn add_option(
        &self,
        _conn: &Connection,
        field: &FieldDescriptor,
        sort_order: i64,
        store_id: i64,
        value: &str,
        test: bool,
    ) -> ImportResult<()> {
        self.attempts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(OptionCreationAttempt {
                entity_type: field.entity_type.clone(),
                code: field.code.clone(),
                store_id,
                value: value.to_string(),
                sort_order,
                test,
            });

        if self.reject_option_creation {
            return Err(ImportError::OptionCreation {
                field: field.code.clone(),
                value: value.to_string(),
                message: "元数据系统拒绝创建选项".to_string(),
            });
        }

        if test {
            debug!(field = %field.code, value, "试运行: 跳过选项写入");
            return Ok(());
        }

        let mut options = self.options.lock().unwrap_or_else(|p| p.into_inner());
        let next_id = options
            .values()
            .flatten()
            .map(|o| o.option_id)
            .max()
            .unwrap_or(0)
            + 1;

        let mut labels = BTreeMap::from([(0, value.to_string())]);
        if store_id != 0 {
            labels.insert(store_id, value.to_string());
        }

        options
            .entry((field.entity_type.clone(), field.code.clone()))
            .or_default()
            .push(OptionValue {
                option_id: next_id,
                key: value.to_string(),
                labels,
            });

        debug!(field = %field.code, value, option_id = next_id, "已创建选项");
        Ok(())
    }

    fn website_store_ids(&self, store_id: i64) -> Vec<i64> {
        self.websites
            .iter()
            .find(|stores| stores.contains(&store_id))
            .cloned()
            .unwrap_or_else(|| vec![store_id])
    }
}

// ==========================================
// SchemaIntrospector Trait
// ==========================================
pub trait SchemaIntrospector: Send + Sync {
    /// 描述物理表的列（表不存在时返回空）
    fn describe_table(&self, conn: &Connection, table: &str) -> ImportResult<Vec<ColumnDescriptor>>;
}

/// SQLite 实现（pragma_table_info）
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteSchemaIntrospector;

impl SchemaIntrospector for SqliteSchemaIntrospector {
    fn describe_table(&self, conn: &Connection, table: &str) -> ImportResult<Vec<ColumnDescriptor>> {
        let mut stmt =
            conn.prepare("SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid")?;

        let rows = stmt.query_map(params![table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut columns = Vec::new();
        for row in rows {
            let (name, declared, not_null) = row?;
            let (data_type, length, scale) = parse_declared_type(&declared);
            columns.push(ColumnDescriptor {
                name,
                data_type,
                nullable: not_null == 0,
                length,
                scale,
            });
        }

        Ok(columns)
    }
}

/// 解析列声明类型，如 "VARCHAR(255)" / "DECIMAL(12,4)"
pub fn parse_declared_type(declared: &str) -> (String, Option<u32>, Option<u32>) {
    let declared = declared.trim();
    let Some((name, rest)) = declared.split_once('(') else {
        return (declared.to_lowercase(), None, None);
    };

    let args = rest.trim_end_matches(')');
    let mut parts = args.split(',').map(|p| p.trim().parse::<u32>().ok());
    let length = parts.next().flatten();
    let scale = parts.next().flatten();

    (name.trim().to_lowercase(), length, scale)
}

// ==========================================
// ColumnCatalog - 表结构缓存
// ==========================================
// 单次运行内有效；跨运行需 clear()
pub struct ColumnCatalog {
    introspector: Box<dyn SchemaIntrospector>,
    tables: HashMap<String, Vec<ColumnDescriptor>>,
}

impl ColumnCatalog {
    pub fn new(introspector: Box<dyn SchemaIntrospector>) -> Self {
        Self {
            introspector,
            tables: HashMap::new(),
        }
    }

    pub fn sqlite() -> Self {
        Self::new(Box::new(SqliteSchemaIntrospector))
    }

    /// 表的全部列（带缓存）
    pub fn describe(&mut self, conn: &Connection, table: &str) -> ImportResult<&[ColumnDescriptor]> {
        if !self.tables.contains_key(table) {
            let columns = self.introspector.describe_table(conn, table)?;
            if columns.is_empty() {
                return Err(ImportError::SchemaResolution {
                    table: table.to_string(),
                    column: "*".to_string(),
                });
            }
            self.tables.insert(table.to_string(), columns);
        }

        Ok(self.tables.get(table).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// 按列名查找
    pub fn column(
        &mut self,
        conn: &Connection,
        table: &str,
        name: &str,
    ) -> ImportResult<Option<ColumnDescriptor>> {
        Ok(self
            .describe(conn, table)?
            .iter()
            .find(|c| c.name == name)
            .cloned())
    }

    /// 值列: 优先 `value` 列，其次同名列，否则无法解析
    pub fn value_column(
        &mut self,
        conn: &Connection,
        table: &str,
        name: &str,
    ) -> ImportResult<ColumnDescriptor> {
        let columns = self.describe(conn, table)?;
        columns
            .iter()
            .find(|c| c.name == "value")
            .or_else(|| columns.iter().find(|c| c.name == name))
            .cloned()
            .ok_or_else(|| ImportError::SchemaResolution {
                table: table.to_string(),
                column: name.to_string(),
            })
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{BackendType, StorageKind};

    fn color_field() -> FieldDescriptor {
        FieldDescriptor {
            entity_type: "catalog_product".to_string(),
            code: "color".to_string(),
            field_id: 93,
            storage: StorageKind::Dynamic,
            backend_type: BackendType::Select,
            table: "product_int".to_string(),
            scope: FieldScope::Store,
        }
    }

    #[test]
    fn test_parse_declared_type() {
        assert_eq!(parse_declared_type("VARCHAR(255)"), ("varchar".to_string(), Some(255), None));
        assert_eq!(
            parse_declared_type("decimal(12, 4)"),
            ("decimal".to_string(), Some(12), Some(4))
        );
        assert_eq!(parse_declared_type("TEXT"), ("text".to_string(), None, None));
    }

    #[test]
    fn test_in_memory_options() {
        let conn = Connection::open_in_memory().unwrap();
        let meta = InMemoryEntityMetadata::new()
            .with_field(color_field())
            .with_option("catalog_product", "color", 5, "red", "Red");
        let field = color_field();

        assert_eq!(meta.option_id_by_label(&field, 1, "Red"), Some(5));
        assert!(meta.has_option_id(&field, 5));
        assert!(meta.has_option_key(&field, "red"));
        assert!(!meta.has_option_key(&field, "blue"));

        meta.add_option(&conn, &field, 0, 0, "Blue", false).unwrap();
        assert_eq!(meta.option_id_by_label(&field, 0, "Blue"), Some(6));
        assert_eq!(meta.option_creation_attempts().len(), 1);

        // 试运行不落库
        meta.add_option(&conn, &field, 0, 0, "Green", true).unwrap();
        assert_eq!(meta.option_id_by_label(&field, 0, "Green"), None);
    }

    #[test]
    fn test_website_store_ids() {
        let meta = InMemoryEntityMetadata::new().with_website(vec![1, 2, 3]);
        assert_eq!(meta.website_store_ids(2), vec![1, 2, 3]);
        assert_eq!(meta.website_store_ids(9), vec![9]);
    }

    #[test]
    fn test_column_catalog_prefers_value_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE product_varchar (entity_id INTEGER, name VARCHAR(255), value VARCHAR(255));
             CREATE TABLE product (entity_id INTEGER NOT NULL, sku VARCHAR(64) NOT NULL);",
        )
        .unwrap();

        let mut catalog = ColumnCatalog::sqlite();
        let column = catalog.value_column(&conn, "product_varchar", "name").unwrap();
        assert_eq!(column.name, "value");
        assert!(column.nullable);

        let sku = catalog.value_column(&conn, "product", "sku").unwrap();
        assert_eq!(sku.name, "sku");
        assert_eq!(sku.length, Some(64));
        assert!(!sku.nullable);

        assert!(matches!(
            catalog.value_column(&conn, "product", "missing"),
            Err(ImportError::SchemaResolution { .. })
        ));
        assert!(matches!(
            catalog.describe(&conn, "no_such_table"),
            Err(ImportError::SchemaResolution { .. })
        ));
    }
}
