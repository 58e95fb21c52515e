// ==========================================
// 批量导入管线 - 运行上下文
// ==========================================
// 职责: 单次运行的全部可变状态（元素、无效原因、摘要、缓存命中、导入分类）
// 约束: 由一个编排器独占；每次运行开始时重置
// ==========================================

use crate::domain::element::{
    ElementMap, ElementNumber, Element, InvalidReason, SourceTransformedRelation,
};
use crate::domain::types::Severity;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// InvalidElements - 无效元素及原因
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvalidElements {
    reasons: BTreeMap<ElementNumber, Vec<InvalidReason>>,
}

impl InvalidElements {
    /// 记录无效原因（任何级别都会使元素无效）
    pub fn add(&mut self, number: ElementNumber, reason: impl Into<String>, severity: Severity) {
        self.reasons
            .entry(number)
            .or_default()
            .push(InvalidReason::new(reason, severity));
    }

    pub fn add_error(&mut self, number: ElementNumber, reason: impl Into<String>) {
        self.add(number, reason, Severity::Error);
    }

    pub fn contains(&self, number: ElementNumber) -> bool {
        self.reasons.contains_key(&number)
    }

    pub fn reasons(&self, number: ElementNumber) -> &[InvalidReason] {
        self.reasons.get(&number).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn numbers(&self) -> BTreeSet<ElementNumber> {
        self.reasons.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElementNumber, &Vec<InvalidReason>)> {
        self.reasons.iter()
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

// ==========================================
// TransformSink - 转换输出
// ==========================================
#[derive(Debug, Default)]
pub struct TransformSink {
    data: ElementMap,
    relations: BTreeSet<SourceTransformedRelation>,
}

impl TransformSink {
    /// 追加转换元素，编号为当前最大编号 + 1
    pub fn add(&mut self, element: Element) -> ElementNumber {
        let number = self
            .data
            .keys()
            .next_back()
            .map(|n| n + 1)
            .unwrap_or(0);
        self.data.insert(number, element);
        number
    }

    /// 以指定编号写入（覆盖同编号元素）
    pub fn add_with_number(&mut self, number: ElementNumber, element: Element) {
        self.data.insert(number, element);
    }

    /// 记录 源 → 转换 关系
    pub fn add_relation(&mut self, source: ElementNumber, transformed: ElementNumber) {
        self.relations
            .insert(SourceTransformedRelation { source, transformed });
    }

    /// 追加由某个源元素产生的转换元素
    pub fn add_derived(&mut self, source: ElementNumber, element: Element) -> ElementNumber {
        let number = self.add(element);
        self.add_relation(source, number);
        number
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_parts(self) -> (ElementMap, BTreeSet<SourceTransformedRelation>) {
        (self.data, self.relations)
    }
}

// ==========================================
// ImportTally - 导入分类
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportTally {
    pub imported: BTreeSet<ElementNumber>,
    pub changed: BTreeSet<ElementNumber>,
    pub unchanged: BTreeSet<ElementNumber>,
}

impl ImportTally {
    pub fn add_imported(&mut self, number: ElementNumber) {
        self.imported.insert(number);
    }

    pub fn add_changed(&mut self, number: ElementNumber) {
        self.changed.insert(number);
    }

    pub fn add_unchanged(&mut self, number: ElementNumber) {
        self.unchanged.insert(number);
    }

    pub fn remove_unchanged(&mut self, number: ElementNumber) {
        self.unchanged.remove(&number);
    }
}

// ==========================================
// StageState - 单阶段状态
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct StageState {
    pub data: ElementMap,
    pub invalid: InvalidElements,
    pub hash_keys: BTreeMap<ElementNumber, String>,
    pub hash_values: BTreeMap<ElementNumber, String>,
    pub cache_ids: BTreeMap<ElementNumber, i64>, // 已知缓存记录（含过期/摘要不一致）
    pub cached: BTreeSet<ElementNumber>,         // 当前有效缓存命中
}

impl StageState {
    /// 未命中缓存的元素编号（含无效元素）
    pub fn uncached_numbers(&self) -> BTreeSet<ElementNumber> {
        self.data
            .keys()
            .filter(|n| !self.cached.contains(*n))
            .copied()
            .collect()
    }

    /// 剩余元素: 既非无效也未命中缓存
    pub fn remaining(&self) -> ElementMap {
        self.data
            .iter()
            .filter(|(n, _)| !self.cached.contains(*n) && !self.invalid.contains(**n))
            .map(|(n, e)| (*n, e.clone()))
            .collect()
    }

    /// 无效元素的数据
    pub fn invalid_data(&self) -> ElementMap {
        self.data
            .iter()
            .filter(|(n, _)| self.invalid.contains(**n))
            .map(|(n, e)| (*n, e.clone()))
            .collect()
    }
}

// ==========================================
// RunContext - 运行上下文
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub source: StageState,
    pub transformed: StageState,
    pub relations: BTreeSet<SourceTransformedRelation>,
    pub tally: ImportTally,
}

impl RunContext {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 源元素 → 其产生的转换元素
    pub fn transformed_by_source(&self) -> BTreeMap<ElementNumber, BTreeSet<ElementNumber>> {
        let mut map: BTreeMap<ElementNumber, BTreeSet<ElementNumber>> = BTreeMap::new();
        for relation in &self.relations {
            map.entry(relation.source)
                .or_default()
                .insert(relation.transformed);
        }
        map
    }

    /// 任一阶段存在无效元素
    pub fn has_errors(&self) -> bool {
        !self.source.invalid.is_empty() || !self.transformed.invalid.is_empty()
    }
}
