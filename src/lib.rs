// ==========================================
// 批量导入管线 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 读取 → 转换 → 导入，源数据/转换数据两级哈希缓存跳过未变更元素
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 元素与类型
pub mod domain;

// 数据仓储层 - 哈希缓存表
pub mod repository;

// 引擎层 - 运行状态机
pub mod engine;

// 导入层 - 读取/校验/变更指令
pub mod importer;

// 配置层 - 导入器配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/表结构）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BackendType, CacheStage, FieldScope, Severity, StorageKind};

// 领域实体
pub use domain::{
    CacheEntry, CachedHash, ChangeInstruction, ColumnDescriptor, Element, ElementMap,
    ElementNumber, FieldDescriptor, InvalidReason, SourceTransformedRelation,
};

// 引擎
pub use engine::{ImportJob, ImportOrchestrator, ImportSummary, RunOutcome};

// 导入组件
pub use importer::{AttributeValidator, ChangeSetBuilder, ImportError, ImportResult};

// 配置
pub use config::{ConfigManager, ImportConfig};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "批量导入管线";
