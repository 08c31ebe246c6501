// ==========================================
// 诊所管理系统 - 批量写入器
// ==========================================
// 职责: 累积新建载荷，达到阈值或输入结束时一次原子批量创建
// 失败语义:
//   - DuplicateKey: 仅剔除冲突载荷（记为重复跳过），其余载荷重试
//   - 占位 CPF 冲突: 重新分配占位值后重试，不计为重复
//   - 其他错误: 整批失败，由调用方改判为技术错误
// ==========================================

use crate::domain::patient::PatientPayload;
use crate::importer::tax_id::PlaceholderTaxIds;
use crate::repository::{RecordStore, RepositoryError};
use std::collections::HashSet;
use tracing::{debug, info, warn};

// ==========================================
// FlushReport - 单次刷新结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    pub batch_number: usize,               // 1 起始的批次序号
    pub created: Vec<(usize, String)>,     // (行号, 新档案 ID)
    pub duplicates: Vec<(usize, String)>,  // (行号, 冲突 CPF)
    pub failed_lines: Vec<usize>,          // 整批失败时的全部行号
    pub failure: Option<String>,
}

impl FlushReport {
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

pub struct BatchWriter {
    batch_size: usize,
    lines: Vec<usize>,
    payloads: Vec<PatientPayload>,
    batches_flushed: usize,
}

impl BatchWriter {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            lines: Vec::with_capacity(batch_size),
            payloads: Vec::with_capacity(batch_size),
            batches_flushed: 0,
        }
    }

    /// 入队一条新建载荷
    ///
    /// # 返回
    /// - true: 已达到批量阈值，调用方应立即刷新
    pub fn push(&mut self, line: usize, payload: PatientPayload) -> bool {
        self.lines.push(line);
        self.payloads.push(payload);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.payloads.len() >= self.batch_size
    }

    pub fn pending_len(&self) -> usize {
        self.payloads.len()
    }

    pub fn batches_flushed(&self) -> usize {
        self.batches_flushed
    }

    /// 刷新当前批次
    ///
    /// # 返回
    /// - None: 无待写入载荷
    /// - Some(FlushReport): 本批各行的最终结果
    pub async fn flush(
        &mut self,
        store: &dyn RecordStore,
        placeholders: &mut PlaceholderTaxIds,
    ) -> Option<FlushReport> {
        if self.payloads.is_empty() {
            return None;
        }

        let mut lines = std::mem::take(&mut self.lines);
        let mut payloads = std::mem::take(&mut self.payloads);
        self.batches_flushed += 1;

        let mut report = FlushReport {
            batch_number: self.batches_flushed,
            ..Default::default()
        };
        let mut seen_duplicates: HashSet<String> = HashSet::new();
        let max_attempts = payloads.len() * 2 + 1;
        let mut attempts = 0;

        debug!(batch = report.batch_number, size = payloads.len(), "开始批量写入");

        while !payloads.is_empty() {
            attempts += 1;
            match store.batch_create(&payloads).await {
                Ok(ids) => {
                    report.created = lines.iter().copied().zip(ids).collect();
                    break;
                }
                Err(RepositoryError::DuplicateKey { tax_id }) if attempts < max_attempts => {
                    let positions: Vec<usize> = payloads
                        .iter()
                        .enumerate()
                        .filter(|(_, p)| p.tax_id() == Some(tax_id.as_str()))
                        .map(|(idx, _)| idx)
                        .collect();

                    if positions.is_empty() {
                        report.failed_lines = lines.clone();
                        report.failure = Some(format!("CPF já cadastrado: {}", tax_id));
                        break;
                    }

                    // 占位值冲突: 换号重试
                    let (placeholder_positions, real_positions): (Vec<usize>, Vec<usize>) =
                        positions
                            .into_iter()
                            .partition(|idx| payloads[*idx].documents.tax_id_is_placeholder);
                    for idx in placeholder_positions {
                        payloads[idx].documents.tax_id = Some(placeholders.next_tax_id());
                    }

                    // 批内同号首次出现时保留第一条，其余跳过
                    let skip: Vec<usize> =
                        if real_positions.len() > 1 && seen_duplicates.insert(tax_id.clone()) {
                            real_positions[1..].to_vec()
                        } else {
                            real_positions
                        };

                    for idx in skip.into_iter().rev() {
                        let line = lines.remove(idx);
                        payloads.remove(idx);
                        warn!(line = line, tax_id = %tax_id, "CPF 重复，跳过该行");
                        report.duplicates.push((line, tax_id.clone()));
                    }
                }
                Err(err) => {
                    warn!(batch = report.batch_number, error = %err, "批量写入失败");
                    report.failed_lines = lines.clone();
                    report.failure = Some(err.to_string());
                    break;
                }
            }
        }

        report.duplicates.sort_by_key(|(line, _)| *line);
        info!(
            batch = report.batch_number,
            created = report.created.len(),
            duplicates = report.duplicates.len(),
            failed = report.failed_lines.len(),
            "批量写入完成"
        );

        Some(report)
    }
}
