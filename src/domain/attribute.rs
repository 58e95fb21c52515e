// ==========================================
// 批量导入管线 - 目标字段与变更指令模型
// ==========================================
// 职责: 描述目标实体上的字段（固定列 / 动态属性）、物理列、写入指令
// ==========================================

use crate::domain::types::{BackendType, FieldScope, StorageKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 商品实体类型
pub const ENTITY_CATALOG_PRODUCT: &str = "catalog_product";

/// 分类实体类型
pub const ENTITY_CATALOG_CATEGORY: &str = "catalog_category";

/// 默认作用域（管理端）门店 ID
pub const DEFAULT_STORE_ID: i64 = 0;

/// 价格类字段（全局价格策略开启时强制全局作用域）
pub const PRICE_FIELD_CODES: [&str; 3] = ["minimal_price", "price", "special_price"];

/// 仅商品/分类支持门店级覆写
pub fn is_scope_aware_entity(entity_type: &str) -> bool {
    entity_type == ENTITY_CATALOG_PRODUCT || entity_type == ENTITY_CATALOG_CATEGORY
}

// ==========================================
// FieldDescriptor - 目标字段描述
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub entity_type: String,       // 实体类型代码
    pub code: String,              // 字段代码
    pub field_id: i64,             // 字段 ID（动态属性写入用）
    pub storage: StorageKind,      // 固定列 / 动态属性
    pub backend_type: BackendType, // 后端存储类型
    pub table: String,             // 存储表
    pub scope: FieldScope,         // 作用域（非门店感知实体忽略）
}

impl FieldDescriptor {
    pub fn is_static(&self) -> bool {
        self.storage == StorageKind::Static
    }
}

// ==========================================
// ColumnDescriptor - 物理列描述
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,      // 列名
    pub data_type: String, // 原生类型（小写，不含长度）
    pub nullable: bool,    // 是否可空
    pub length: Option<u32>,
    pub scale: Option<u32>,
}

impl ColumnDescriptor {
    pub fn backend_type(&self) -> BackendType {
        BackendType::from_db_str(&self.data_type)
    }
}

// ==========================================
// ChangeInstruction - 写入指令
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeInstruction {
    /// 单行写入: 实体 ID → 列 → 值
    Single {
        table: String,
        entity_id: i64,
        column: String,
        value: Value,
    },
    /// 属性表写入: 实体 ID + 字段 ID + 门店 ID（非门店感知实体为 None）
    Scoped {
        table: String,
        entity_id: i64,
        field_id: i64,
        store_id: Option<i64>,
        value: Value,
    },
}

impl ChangeInstruction {
    pub fn table(&self) -> &str {
        match self {
            ChangeInstruction::Single { table, .. } | ChangeInstruction::Scoped { table, .. } => {
                table
            }
        }
    }

    pub fn store_id(&self) -> Option<i64> {
        match self {
            ChangeInstruction::Single { .. } => None,
            ChangeInstruction::Scoped { store_id, .. } => *store_id,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            ChangeInstruction::Single { value, .. } | ChangeInstruction::Scoped { value, .. } => {
                value
            }
        }
    }
}
