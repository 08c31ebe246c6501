// ==========================================
// 诊所管理系统 - 导入运行领域模型
// ==========================================
// 职责: 校验结论 / 行结果 / 计数器 / 进度事件 / 运行汇总
// 生命周期: 仅在单次导入运行内创建与消费，汇总可由调用方保留或导出
// ==========================================

use crate::domain::types::{ConflictPolicy, ImportPhase, LiveItemType, PendingField, RowStatus};
use serde::{Deserialize, Serialize};

// ==========================================
// ValidationOutcome - 单行校验结论
// ==========================================
// 不变量: pending_critical_fields ⊆ pending_fields ⊆ 固定待补字段集
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub warnings: Vec<String>,
    pub real_errors: Vec<String>,
    pub pending_fields: Vec<PendingField>,
    pub pending_critical_fields: Vec<PendingField>,
}

// ==========================================
// RowOutcome - 行级审计结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub line: usize,                 // 1 起始的数据行号
    pub name: String,                // 展示名（缺失回退 "Linha N"）
    pub tax_id: Option<String>,      // 文件中的原始 CPF
    pub status: RowStatus,
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_fields: Vec<PendingField>,
}

impl RowOutcome {
    pub fn has_pending(&self) -> bool {
        !self.pending_fields.is_empty()
    }

    /// 转换为实时展示条目
    pub fn to_live_item(&self) -> LiveItem {
        let item_type = match self.status {
            RowStatus::Created | RowStatus::Updated if self.has_pending() => {
                LiveItemType::ImportedPending
            }
            RowStatus::Created | RowStatus::Updated => LiveItemType::Imported,
            RowStatus::Merged => LiveItemType::Merged,
            RowStatus::DuplicateSkipped => LiveItemType::DuplicateSkipped,
            RowStatus::Ignored => LiveItemType::Ignored,
            RowStatus::TechnicalError => LiveItemType::Error,
        };

        LiveItem {
            item_type,
            line: self.line,
            name: Some(self.name.clone()),
            message: self.reason.clone(),
        }
    }
}

// ==========================================
// ImportCounters - 结果计数器
// ==========================================
// 不变量: 六项之和 == 实际处理行数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCounters {
    pub created: usize,
    pub updated: usize,
    pub merged: usize,
    pub duplicate_skipped: usize,
    pub ignored: usize,
    pub technical_errors: usize,
}

impl ImportCounters {
    fn slot_mut(&mut self, status: RowStatus) -> &mut usize {
        match status {
            RowStatus::Created => &mut self.created,
            RowStatus::Updated => &mut self.updated,
            RowStatus::Merged => &mut self.merged,
            RowStatus::DuplicateSkipped => &mut self.duplicate_skipped,
            RowStatus::Ignored => &mut self.ignored,
            RowStatus::TechnicalError => &mut self.technical_errors,
        }
    }

    pub fn record(&mut self, status: RowStatus) {
        *self.slot_mut(status) += 1;
    }

    /// 改判（如 CREATED → DUPLICATE_SKIPPED），总数不变
    pub fn reclassify(&mut self, from: RowStatus, to: RowStatus) {
        let slot = self.slot_mut(from);
        *slot = slot.saturating_sub(1);
        self.record(to);
    }

    pub fn total(&self) -> usize {
        self.created
            + self.updated
            + self.merged
            + self.duplicate_skipped
            + self.ignored
            + self.technical_errors
    }
}

// ==========================================
// RowErrorEntry - 行级错误明细
// ==========================================
/// 错误归属：输入行号，或批量写入失败时的合成 "lote N" 标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowRef {
    Line(usize),
    Batch(String),
}

impl RowRef {
    pub fn batch(index: usize) -> Self {
        RowRef::Batch(format!("lote {}", index))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowErrorEntry {
    pub row: RowRef,
    pub errors: Vec<String>,
}

// ==========================================
// ProgressEvent - 进度快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveItem {
    #[serde(rename = "type")]
    pub item_type: LiveItemType,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: ImportPhase,
    pub current: usize,
    pub total: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_item: Option<LiveItem>,
}

// ==========================================
// ImportSummary - 单次运行汇总（调用方返回值）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub run_id: String,
    pub policy: ConflictPolicy,
    #[serde(flatten)]
    pub counters: ImportCounters,
    pub with_pending: usize,
    pub truncated: bool,
    pub total_rows_in_file: usize,
    pub processed_rows: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub report_rows: Vec<RowOutcome>,
    pub errors: Vec<RowErrorEntry>,
}

impl ImportSummary {
    /// 计数器与报告行是否对账
    pub fn is_reconciled(&self) -> bool {
        self.counters.total() == self.processed_rows
            && self.report_rows.len() == self.processed_rows
    }
}
