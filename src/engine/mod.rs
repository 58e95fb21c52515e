// ==========================================
// 批量导入管线 - 引擎层
// ==========================================
// 职责: 导入运行状态机与运行上下文
// 红线: 元素级问题只剔除元素，基础设施错误终止运行
// ==========================================

pub mod import_job;
pub mod orchestrator;
pub mod run_context;

// 重导出核心引擎
pub use import_job::ImportJob;
pub use orchestrator::{ImportOrchestrator, ImportSummary, RunOutcome};
pub use run_context::{ImportTally, InvalidElements, RunContext, StageState, TransformSink};
