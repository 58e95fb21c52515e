// ==========================================
// 批量导入管线 - 领域模型层
// ==========================================
// 职责: 定义元素、缓存记录、字段描述、写入指令等领域类型
// 红线: 不含数据访问逻辑,不含管线逻辑
// ==========================================

pub mod attribute;
pub mod cache;
pub mod element;
pub mod types;

// 重导出核心类型
pub use attribute::{
    is_scope_aware_entity, ChangeInstruction, ColumnDescriptor, FieldDescriptor,
    DEFAULT_STORE_ID, ENTITY_CATALOG_CATEGORY, ENTITY_CATALOG_PRODUCT, PRICE_FIELD_CODES,
};
pub use cache::{CacheEntry, CachedHash};
pub use element::{
    Element, ElementMap, ElementNumber, InvalidReason, SourceTransformedRelation,
};
pub use types::{BackendType, CacheStage, FieldScope, Severity, SpecialKind, StorageKind};
