// ==========================================
// 批量导入管线 - 导入层
// ==========================================
// 职责: 源数据读取、属性值校验与规整、变更指令构建、内容摘要
// 支持: Excel, CSV
// ==========================================

// 模块声明
pub mod attribute_validator;
pub mod change_set;
pub mod error;
pub mod hashing;
pub mod metadata;
pub mod source_reader;
pub mod value_coercer;

// 重导出核心类型
pub use attribute_validator::{AttributeValidator, SpecialFields, ValidationOptions};
pub use change_set::{ChangeSetBuilder, ChangeSetOptions};
pub use error::{ImportError, ImportResult};
pub use hashing::{canonical_element, canonical_json, content_digest, element_digest};
pub use metadata::{
    ColumnCatalog, EntityMetadataProvider, InMemoryEntityMetadata, OptionCreationAttempt,
    SchemaIntrospector, SqliteSchemaIntrospector,
};
pub use source_reader::{CsvSourceReader, ExcelSourceReader, FileSourceReader, SourceReader};
pub use value_coercer::{prepare_column_value, prepare_special_value, prepare_value};
