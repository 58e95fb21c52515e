// ==========================================
// 批量导入管线 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供哈希缓存表的数据访问接口,屏蔽数据库细节
// 约束: 值一律参数化绑定；表名仅来自 CacheStage
// ==========================================

pub mod error;
pub mod hash_cache_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use hash_cache_repo::{HashCacheRepository, SqliteHashCacheRepository};
