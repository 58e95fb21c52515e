// ==========================================
// 批量导入管线 - 导入编排器
// ==========================================
// 用途: 驱动一次导入运行的状态机
// 流程:
//   准备 → 读取 → 源校验 → 源缓存过滤 → 预处理 → 转换
//   → 转换校验（事务内） → 转换缓存过滤 → 导入 → 写缓存
// 失败语义: 元素级问题只剔除元素；基础设施错误终止运行
// ==========================================

use crate::config::ImportConfig;
use crate::domain::element::{ElementMap, ElementNumber};
use crate::domain::types::CacheStage;
use crate::engine::import_job::ImportJob;
use crate::engine::run_context::{ImportTally, InvalidElements, RunContext, StageState, TransformSink};
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::hash_cache_repo::{HashCacheRepository, SqliteHashCacheRepository};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

// ==========================================
// RunOutcome - 运行终态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    NoSourceElements,   // 无源数据
    NothingToTransform, // 源元素全部命中缓存或无效
    NothingToImport,    // 转换元素全部命中缓存或无效
    Imported,           // 已执行导入
}

// ==========================================
// ImportSummary - 运行汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub run_id: String,
    pub outcome: RunOutcome,

    // 计数
    pub source_count: usize,
    pub source_invalid: usize,
    pub source_cached: usize,
    pub transformed_count: usize,
    pub transformed_invalid: usize,
    pub transformed_cached: usize,
    pub imported: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub source_cache_saved: usize,
    pub transformed_cache_saved: usize,

    // 元素编号集合
    pub source_invalid_numbers: BTreeSet<ElementNumber>,
    pub transformed_invalid_numbers: BTreeSet<ElementNumber>,
    pub imported_numbers: BTreeSet<ElementNumber>,
    pub changed_numbers: BTreeSet<ElementNumber>,
    pub unchanged_numbers: BTreeSet<ElementNumber>,

    pub has_errors: bool,
    pub elapsed_ms: u64,
}

// ==========================================
// ImportOrchestrator - 导入编排器
// ==========================================
pub struct ImportOrchestrator<J: ImportJob> {
    job: J,
    config: ImportConfig,
    conn: Arc<Mutex<Connection>>,
    source_cache: Box<dyn HashCacheRepository>,
    transformed_cache: Box<dyn HashCacheRepository>,
    ctx: RunContext,
    saved: BTreeMap<CacheStage, usize>,
}

impl<J: ImportJob> ImportOrchestrator<J> {
    /// 创建编排器，两个缓存阶段共用目标库连接
    ///
    /// # 参数
    /// - job: 导入作业
    /// - config: 导入器配置
    /// - conn: 目标库连接（需已安装缓存表）
    pub fn new(job: J, config: ImportConfig, conn: Arc<Mutex<Connection>>) -> Self {
        let source_cache = Box::new(SqliteHashCacheRepository::from_connection(
            conn.clone(),
            CacheStage::Source,
        ));
        let transformed_cache = Box::new(SqliteHashCacheRepository::from_connection(
            conn.clone(),
            CacheStage::Transformed,
        ));
        Self::with_caches(job, config, conn, source_cache, transformed_cache)
    }

    /// 使用自定义缓存仓储创建编排器
    pub fn with_caches(
        job: J,
        config: ImportConfig,
        conn: Arc<Mutex<Connection>>,
        source_cache: Box<dyn HashCacheRepository>,
        transformed_cache: Box<dyn HashCacheRepository>,
    ) -> Self {
        Self {
            job,
            config,
            conn,
            source_cache,
            transformed_cache,
            ctx: RunContext::default(),
            saved: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    pub fn job_mut(&mut self) -> &mut J {
        &mut self.job
    }

    pub fn into_job(self) -> J {
        self.job
    }

    /// 最近一次运行的上下文
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn transformed_data(&self) -> &ElementMap {
        &self.ctx.transformed.data
    }

    pub fn transformed_invalid_element_numbers(&self) -> BTreeSet<ElementNumber> {
        self.ctx.transformed.invalid.numbers()
    }

    pub fn transformed_invalid_elements_data(&self) -> ElementMap {
        self.ctx.transformed.invalid_data()
    }

    pub fn transformed_changed_element_numbers(&self) -> &BTreeSet<ElementNumber> {
        &self.ctx.tally.changed
    }

    pub fn has_errors(&self) -> bool {
        self.ctx.has_errors()
    }

    /// 执行一次完整运行
    ///
    /// # 返回
    /// - Ok(ImportSummary): 运行汇总（含元素级无效信息）
    /// - Err: 基础设施错误（读取失败 / 事务失败 / 缓存查询失败）
    pub fn run(&mut self) -> ImportResult<ImportSummary> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("import_run", run_id = %run_id, importer = %self.config.importer);
        let _guard = span.enter();

        let started = Instant::now();
        self.ctx.reset();
        self.saved.clear();

        info!(entities = self.job.entities_log_name(), test = self.config.test, "开始导入运行");

        self.job.prepare()?;
        let outcome = self.execute()?;
        self.job.cleanup()?;

        let summary = self.summarize(run_id, outcome, started.elapsed().as_millis() as u64);
        info!(
            outcome = ?summary.outcome,
            read = summary.source_count,
            source_cached = summary.source_cached,
            source_invalid = summary.source_invalid,
            transformed = summary.transformed_count,
            transformed_cached = summary.transformed_cached,
            transformed_invalid = summary.transformed_invalid,
            imported = summary.imported,
            changed = summary.changed,
            unchanged = summary.unchanged,
            elapsed_ms = summary.elapsed_ms,
            "导入运行结束"
        );

        Ok(summary)
    }

    fn execute(&mut self) -> ImportResult<RunOutcome> {
        let entities = self.job.entities_log_name().to_string();

        // ==========================================
        // 读取源数据
        // ==========================================
        let data = self.job.read_source_data()?;
        if data.is_empty() {
            info!(entities = %entities, "没有可导入的源数据");
            return Ok(RunOutcome::NoSourceElements);
        }
        info!(entities = %entities, count = data.len(), "源数据读取完成");
        self.ctx.source.data = data;

        // ==========================================
        // 源校验 + 源缓存过滤
        // ==========================================
        let mut invalid = InvalidElements::default();
        self.job.validate_source_data(&self.ctx.source.data, &mut invalid)?;
        self.ctx.source.invalid = invalid;

        self.check_cached(CacheStage::Source)?;

        if self.ctx.source.uncached_numbers().is_empty() {
            info!(entities = %entities, "源数据全部命中缓存，无需转换");
            return Ok(RunOutcome::NothingToTransform);
        }

        let mut remaining = self.ctx.source.remaining();
        if remaining.is_empty() {
            self.display_invalid(CacheStage::Source);
            info!(entities = %entities, "没有有效的未缓存源数据");
            return Ok(RunOutcome::NothingToTransform);
        }

        // ==========================================
        // 预处理 + 转换
        // ==========================================
        self.job.prepare_source_data(&mut remaining)?;
        for (number, element) in &remaining {
            self.ctx.source.data.insert(*number, element.clone());
        }

        self.ctx.relations.clear();
        let mut sink = TransformSink::default();
        self.job.transform_data(&remaining, &mut sink)?;
        let (transformed, relations) = sink.into_parts();
        info!(entities = %entities, input = remaining.len(), output = transformed.len(), "转换完成");
        self.ctx.transformed.data = transformed;
        self.ctx.relations = relations;

        self.display_invalid(CacheStage::Source);

        // ==========================================
        // 转换校验（事务内） + 转换缓存过滤
        // ==========================================
        self.validate_transformed()?;
        self.check_cached(CacheStage::Transformed)?;

        if self.ctx.transformed.uncached_numbers().is_empty() {
            info!(entities = %entities, "转换数据全部命中缓存，无需导入");
            self.save_source_cache();
            return Ok(RunOutcome::NothingToImport);
        }

        let remaining = self.ctx.transformed.remaining();
        self.display_invalid(CacheStage::Transformed);

        if remaining.is_empty() {
            info!(entities = %entities, "没有有效的未缓存转换数据");
            self.save_source_cache();
            self.save_transformed_cache();
            return Ok(RunOutcome::NothingToImport);
        }

        // ==========================================
        // 导入
        // ==========================================
        let mut tally = ImportTally::default();
        {
            let conn = self
                .conn
                .lock()
                .map_err(|e| ImportError::Database(format!("锁获取失败: {}", e)))?;
            self.job.import_transformed_data(&conn, &remaining, &mut tally)?;
        }
        info!(
            entities = %entities,
            imported = tally.imported.len(),
            changed = tally.changed.len(),
            unchanged = tally.unchanged.len(),
            "导入完成"
        );
        self.ctx.tally = tally;

        self.save_source_cache();
        self.save_transformed_cache();

        Ok(RunOutcome::Imported)
    }

    /// 在目标库事务内执行转换校验；钩子失败时回滚
    fn validate_transformed(&mut self) -> ImportResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::Transaction(format!("锁获取失败: {}", e)))?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| ImportError::Transaction(e.to_string()))?;

        let mut invalid = InvalidElements::default();
        let result = self
            .job
            .validate_transformed_data(&tx, &mut self.ctx.transformed.data, &mut invalid);

        match result {
            Ok(()) => {
                tx.commit()
                    .map_err(|e| ImportError::Transaction(e.to_string()))?;
                debug!(invalid = invalid.len(), "转换校验事务已提交");
                self.ctx.transformed.invalid = invalid;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!(error = %rollback_err, "转换校验事务回滚失败");
                }
                Err(err)
            }
        }
    }

    fn stage_state(&self, stage: CacheStage) -> &StageState {
        match stage {
            CacheStage::Source => &self.ctx.source,
            CacheStage::Transformed => &self.ctx.transformed,
        }
    }

    fn cache_repo(&self, stage: CacheStage) -> &dyn HashCacheRepository {
        match stage {
            CacheStage::Source => self.source_cache.as_ref(),
            CacheStage::Transformed => self.transformed_cache.as_ref(),
        }
    }

    /// 计算摘要并批量查询缓存，标记当前有效的命中
    fn check_cached(&mut self, stage: CacheStage) -> ImportResult<()> {
        let stage_config = self.config.cache(stage).clone();
        if !stage_config.enabled {
            debug!(stage = %stage, "缓存未启用");
            return Ok(());
        }

        let mut hash_keys = BTreeMap::new();
        let mut hash_values = BTreeMap::new();
        {
            let state = self.stage_state(stage);
            for (number, element) in &state.data {
                if state.invalid.contains(*number) {
                    continue;
                }

                let (key, value) = match stage {
                    CacheStage::Source => (
                        self.job.source_hash_key(*number, element),
                        self.job.source_hash_value(*number, element),
                    ),
                    CacheStage::Transformed => (
                        self.job.transformed_hash_key(*number, element),
                        self.job.transformed_hash_value(*number, element),
                    ),
                };

                match (key, value) {
                    (Some(key), Some(value)) if !key.is_empty() && !value.is_empty() => {
                        hash_keys.insert(*number, key);
                        hash_values.insert(*number, value);
                    }
                    _ => {}
                }
            }
        }

        let found = self
            .cache_repo(stage)
            .lookup(&stage_config.prefix, &hash_keys)?;

        let now = Utc::now();
        let mut cache_ids = BTreeMap::new();
        let mut cached = BTreeSet::new();
        for (number, hit) in found {
            cache_ids.insert(number, hit.cache_id);
            let fresh = hash_values
                .get(&number)
                .map_or(false, |value| hit.is_valid_for(value, now));
            if fresh {
                cached.insert(number);
            }
        }

        info!(
            stage = %stage,
            eligible = hash_keys.len(),
            known = cache_ids.len(),
            cached = cached.len(),
            "缓存过滤完成"
        );

        let state = match stage {
            CacheStage::Source => &mut self.ctx.source,
            CacheStage::Transformed => &mut self.ctx.transformed,
        };
        state.hash_keys = hash_keys;
        state.hash_values = hash_values;
        state.cache_ids = cache_ids;
        state.cached = cached;

        Ok(())
    }

    fn display_invalid(&self, stage: CacheStage) {
        let state = self.stage_state(stage);
        for (number, reasons) in state.invalid.iter() {
            let Some(element) = state.data.get(number) else {
                continue;
            };
            match stage {
                CacheStage::Source => self.job.display_invalid_source_element(*number, element, reasons),
                CacheStage::Transformed => {
                    self.job
                        .display_invalid_transformed_element(*number, element, reasons)
                }
            }
        }
    }

    /// 写源缓存: 其全部转换元素均已导入或命中缓存，且自身未命中缓存
    fn save_source_cache(&mut self) {
        if !self.config.source_cache.enabled {
            return;
        }

        let candidates: Vec<ElementNumber> = self
            .ctx
            .transformed_by_source()
            .into_iter()
            .filter(|(source, _)| !self.ctx.source.cached.contains(source))
            .filter(|(_, transformed)| {
                transformed.iter().all(|t| {
                    self.ctx.tally.imported.contains(t) || self.ctx.transformed.cached.contains(t)
                })
            })
            .map(|(source, _)| source)
            .collect();

        self.save_entries(CacheStage::Source, &candidates);
    }

    /// 写转换缓存: 已导入且未命中缓存的元素
    fn save_transformed_cache(&mut self) {
        if !self.config.transformed_cache.enabled {
            return;
        }

        let candidates: Vec<ElementNumber> = self
            .ctx
            .tally
            .imported
            .iter()
            .filter(|n| !self.ctx.transformed.cached.contains(*n))
            .copied()
            .collect();

        self.save_entries(CacheStage::Transformed, &candidates);
    }

    /// 逐条写缓存；失败只记录日志
    fn save_entries(&mut self, stage: CacheStage, numbers: &[ElementNumber]) {
        let stage_config = self.config.cache(stage).clone();
        let expires_at: DateTime<Utc> = stage_config.expiry.resolve(Utc::now());
        let mut saved = 0usize;

        for number in numbers {
            let state = self.stage_state(stage);
            let Some(value) = state.hash_values.get(number) else {
                continue;
            };
            let Some(key) = state.hash_keys.get(number) else {
                warn!(stage = %stage, element = number, "缺少缓存键，跳过保存");
                continue;
            };
            let cache_id = state.cache_ids.get(number).copied();

            if self.config.test {
                debug!(stage = %stage, element = number, hash_key = %key, "试运行: 跳过缓存保存");
                continue;
            }

            match self
                .cache_repo(stage)
                .save(&stage_config.prefix, key, value, expires_at, cache_id)
            {
                Ok(_) => saved += 1,
                Err(err) => {
                    error!(stage = %stage, element = number, hash_key = %key, error = %err, "缓存保存失败");
                }
            }
        }

        if saved > 0 {
            info!(stage = %stage, saved, "缓存已保存");
        }
        *self.saved.entry(stage).or_insert(0) += saved;
    }

    fn summarize(&self, run_id: String, outcome: RunOutcome, elapsed_ms: u64) -> ImportSummary {
        let ctx = &self.ctx;
        ImportSummary {
            run_id,
            outcome,
            source_count: ctx.source.data.len(),
            source_invalid: ctx.source.invalid.len(),
            source_cached: ctx.source.cached.len(),
            transformed_count: ctx.transformed.data.len(),
            transformed_invalid: ctx.transformed.invalid.len(),
            transformed_cached: ctx.transformed.cached.len(),
            imported: ctx.tally.imported.len(),
            changed: ctx.tally.changed.len(),
            unchanged: ctx.tally.unchanged.len(),
            source_cache_saved: self.saved.get(&CacheStage::Source).copied().unwrap_or(0),
            transformed_cache_saved: self
                .saved
                .get(&CacheStage::Transformed)
                .copied()
                .unwrap_or(0),
            source_invalid_numbers: ctx.source.invalid.numbers(),
            transformed_invalid_numbers: ctx.transformed.invalid.numbers(),
            imported_numbers: ctx.tally.imported.clone(),
            changed_numbers: ctx.tally.changed.clone(),
            unchanged_numbers: ctx.tally.unchanged.clone(),
            has_errors: ctx.has_errors(),
            elapsed_ms,
        }
    }
}
