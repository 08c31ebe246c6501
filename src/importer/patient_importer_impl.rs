// ==========================================
// 诊所管理系统 - 患者导入器实现
// ==========================================
// 职责: 整合导入流程，从文件到记录存储
// 流程: 解析 → 表头映射 → [分块循环: 标准化 → 校验 → 冲突匹配 → 更新/入队] → 刷新 → 汇总
// 红线:
//   - 逐行处理开始后任何单行失败都不中止运行
//   - 计数器之和恒等于实际处理行数
//   - 取消时先刷新已入队批次，再返回部分汇总
// ==========================================

use crate::config::{ImportConfigReader, ImportSettings};
use crate::domain::import::{
    ImportCounters, ImportSummary, ProgressEvent, RowErrorEntry, RowOutcome, RowRef,
    ValidationOutcome,
};
use crate::domain::patient::{CanonicalRow, UpdateMode};
use crate::domain::types::{ConflictPolicy, ImportPhase, RowStatus};
use crate::importer::batch_writer::{BatchWriter, FlushReport};
use crate::importer::conflict_handler::{ConflictHandler, KeyIndex};
use crate::importer::dq_validator::{DqValidator, ValidationContext};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::{FieldMapper, HeaderMapping};
use crate::importer::file_parser::{RawRow, RawTable, UniversalFileParser};
use crate::importer::patient_importer_trait::{
    ConflictResolver, FieldAliasResolver, FileParser, PatientImporter, PayloadBuilder,
    RowNormalizer, RowValidator,
};
use crate::importer::payload_builder::PatientPayloadBuilder;
use crate::importer::progress::{CancellationCheck, ProgressSink, Scheduler, TokioScheduler};
use crate::importer::tax_id::PlaceholderTaxIds;
use crate::repository::{RecordStore, RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const IGNORED_REASON: &str = "Linha sem nome, CPF ou telefone válido";
const SINGLE_CREATE_ATTEMPTS: usize = 3;

// ==========================================
// PatientImporterImpl - 患者导入器实现
// ==========================================
pub struct PatientImporterImpl<S, C>
where
    S: RecordStore,
    C: ImportConfigReader,
{
    // 记录存储（唯一共享可变资源）
    store: Arc<S>,

    // 配置读取器
    config: C,

    // 导入组件
    file_parser: Box<dyn FileParser>,
    alias_resolver: Box<dyn FieldAliasResolver>,
    row_normalizer: Box<dyn RowNormalizer>,
    row_validator: Box<dyn RowValidator>,
    conflict_resolver: Box<dyn ConflictResolver>,
    payload_builder: Box<dyn PayloadBuilder>,

    // 协作式让出
    scheduler: Box<dyn Scheduler>,
}

impl<S, C> PatientImporterImpl<S, C>
where
    S: RecordStore,
    C: ImportConfigReader,
{
    /// 创建新的 PatientImporter 实例
    ///
    /// # 参数
    /// - store: 记录存储
    /// - config: 配置读取器
    /// - file_parser: 文件解析器
    /// - alias_resolver: 表头别名解析器
    /// - row_normalizer: 行标准化器
    /// - row_validator: 行校验器
    /// - conflict_resolver: 冲突匹配器
    /// - payload_builder: 载荷构建器
    /// - scheduler: 让出调度器
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        config: C,
        file_parser: Box<dyn FileParser>,
        alias_resolver: Box<dyn FieldAliasResolver>,
        row_normalizer: Box<dyn RowNormalizer>,
        row_validator: Box<dyn RowValidator>,
        conflict_resolver: Box<dyn ConflictResolver>,
        payload_builder: Box<dyn PayloadBuilder>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        Self {
            store,
            config,
            file_parser,
            alias_resolver,
            row_normalizer,
            row_validator,
            conflict_resolver,
            payload_builder,
            scheduler,
        }
    }

    /// 使用默认组件装配
    pub fn with_default_components(store: Arc<S>, config: C) -> Self {
        Self::new(
            store,
            config,
            Box::new(UniversalFileParser),
            Box::new(FieldMapper::new()),
            Box::new(FieldMapper::new()),
            Box::new(DqValidator::new()),
            Box::new(ConflictHandler::new()),
            Box::new(PatientPayloadBuilder::default()),
            Box::new(TokioScheduler),
        )
    }

    /// 替换让出调度器（单线程测试环境使用 InlineScheduler）
    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    async fn load_settings(&self) -> ImportResult<ImportSettings> {
        ImportSettings::load(&self.config)
            .await
            .map_err(|e| ImportError::ConfigReadError(e.to_string()))
    }

    /// 处理单行（不返回错误，结果写入运行状态）
    ///
    /// # 返回
    /// - true: 本行触发了批量刷新
    async fn process_row(
        &self,
        line: usize,
        raw: &RawRow,
        mapping: &HeaderMapping,
        env: &RowEnv<'_>,
        state: &mut RunState,
    ) -> bool {
        let row = self.row_normalizer.normalize_row(mapping, raw);

        // (1) 最低识别信号
        if !self.row_validator.has_minimum_signal(&row) {
            debug!(line = line, "缺少识别信号，忽略该行");
            state.record(RunState::outcome(
                line,
                &row,
                RowStatus::Ignored,
                Some(IGNORED_REASON.to_string()),
            ));
            return false;
        }

        // (2) 校验与待补字段
        let validation = self.row_validator.validate(&row, &env.ctx);
        state.push_errors(RowRef::Line(line), validation.real_errors.clone());

        // (3) 冲突匹配
        match self
            .conflict_resolver
            .resolve(&row, env.policy, env.index)
        {
            // (4a) 命中已有档案: 逐行更新
            Some(id) => {
                match self.update_existing(&id, &row, &validation, env.policy).await {
                    Ok(status) => {
                        debug!(line = line, id = %id, status = %status, "已更新已有档案");
                        state.record(RunState::persisted(line, &row, status, &validation));
                    }
                    Err(e) => {
                        warn!(line = line, id = %id, error = %e, "更新档案失败");
                        state.record_technical_error(
                            line,
                            &row,
                            format!("Falha ao atualizar registro: {}", e),
                        );
                    }
                }
                false
            }
            // (4b) 新档案: 入队等待批量创建
            None => {
                let payload =
                    self.payload_builder
                        .build_create(&row, &validation, &mut state.placeholders);
                state.record(RunState::persisted(
                    line,
                    &row,
                    RowStatus::Created,
                    &validation,
                ));

                if state.writer.push(line, payload) {
                    self.flush(state).await;
                    self.scheduler.yield_now().await;
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn update_existing(
        &self,
        id: &str,
        row: &CanonicalRow,
        validation: &ValidationOutcome,
        policy: ConflictPolicy,
    ) -> RepositoryResult<RowStatus> {
        let (mode, status) = match policy {
            ConflictPolicy::Merge => (UpdateMode::Merge, RowStatus::Merged),
            _ => (UpdateMode::Replace, RowStatus::Updated),
        };
        let update = self.payload_builder.build_update(row, validation, mode);
        self.store.update(id, &update).await?;
        Ok(status)
    }

    async fn flush(&self, state: &mut RunState) {
        let store: &dyn RecordStore = self.store.as_ref();
        if let Some(report) = state.writer.flush(store, &mut state.placeholders).await {
            state.apply_flush(report);
        }
    }

    /// 单条新建（JSON 路径），占位 CPF 冲突时换号重试
    async fn create_single(
        &self,
        row: &CanonicalRow,
        validation: &ValidationOutcome,
        placeholders: &mut PlaceholderTaxIds,
    ) -> RepositoryResult<String> {
        let mut payload = self.payload_builder.build_create(row, validation, placeholders);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.store.create(&payload).await {
                Err(RepositoryError::DuplicateKey { .. })
                    if payload.documents.tax_id_is_placeholder
                        && attempts < SINGLE_CREATE_ATTEMPTS =>
                {
                    payload.documents.tax_id = Some(placeholders.next_tax_id());
                }
                other => return other,
            }
        }
    }

    /// 按查找计划逐键查询存储（JSON 路径不加载键快照）
    async fn find_existing(
        &self,
        row: &CanonicalRow,
        policy: ConflictPolicy,
    ) -> RepositoryResult<Option<String>> {
        for key in self.conflict_resolver.lookup_plan(row, policy) {
            if let Some(id) = self.store.find_by_key(&key).await? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl<S, C> PatientImporter for PatientImporterImpl<S, C>
where
    S: RecordStore,
    C: ImportConfigReader,
{
    /// 从文件导入患者记录
    ///
    /// # 参数
    /// - file_path: CSV / Excel 文件路径
    /// - policy: 冲突策略
    ///
    /// # 返回
    /// - Ok(ImportSummary): 运行汇总
    /// - Err: 预检失败（文件不存在 / 格式不支持 / 无法读取）
    #[instrument(skip(self, file_path, progress, cancel))]
    async fn import_file(
        &self,
        file_path: &Path,
        policy: ConflictPolicy,
        progress: &dyn ProgressSink,
        cancel: &dyn CancellationCheck,
    ) -> ImportResult<ImportSummary> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        // === 步骤 1: 解析文件 ===
        debug!(file = %file_path.display(), "步骤 1: 解析文件");
        let table = self.file_parser.parse_to_raw_table(file_path)?;
        info!(
            file = %file_path.display(),
            total_rows = table.len(),
            columns = table.headers.len(),
            "文件解析完成"
        );

        self.import_rows(table, policy, progress, cancel).await
    }

    #[instrument(skip(self, table, progress, cancel), fields(run_id))]
    async fn import_rows(
        &self,
        table: RawTable,
        policy: ConflictPolicy,
        progress: &dyn ProgressSink,
        cancel: &dyn CancellationCheck,
    ) -> ImportResult<ImportSummary> {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let settings = self.load_settings().await?;
        let RawTable { headers, mut rows } = table;

        // === 步骤 2: 行数上限 ===
        let total_rows_in_file = rows.len();
        let truncated = total_rows_in_file > settings.max_rows;
        if truncated {
            warn!(
                total_rows_in_file = total_rows_in_file,
                max_rows = settings.max_rows,
                "超出单次导入行数上限，超出部分不处理"
            );
            rows.truncate(settings.max_rows);
        }
        let total = rows.len();

        // === 步骤 3: 表头映射（每个文件一次）===
        debug!("步骤 3: 表头映射");
        let mapping = self.alias_resolver.build_mapping(&headers);
        info!(
            mapped = mapping.canonical_count(),
            unmapped = ?mapping.unmapped_headers(),
            "表头映射完成"
        );

        // === 步骤 4: 已有档案键快照 ===
        let index = if policy.reconciles() {
            KeyIndex::from_keys(self.store.load_key_index().await?)
        } else {
            KeyIndex::default()
        };
        debug!(keys = index.len(), "键快照加载完成");

        progress.emit(ProgressEvent {
            phase: ImportPhase::Reading,
            current: 0,
            total,
            message: format!("Arquivo lido: {} linhas", total),
            live_item: None,
        });

        // === 步骤 5: 分块逐行处理 ===
        info!(
            run_id = %run_id,
            total_rows = total,
            chunk_size = settings.chunk_size,
            batch_size = settings.batch_size,
            "开始逐行处理"
        );
        let env = RowEnv {
            policy,
            ctx: ValidationContext::new(Utc::now().date_naive(), settings.minor_age_threshold),
            index: &index,
        };
        let mut state = RunState::new(total, settings.batch_size);
        let mut cancelled = false;

        'chunks: for (chunk_index, chunk) in rows.chunks(settings.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            debug!(chunk = chunk_index + 1, rows = chunk.len(), "开始处理分块");

            for (offset, raw) in chunk.iter().enumerate() {
                let line = chunk_index * settings.chunk_size + offset + 1;
                let flushed = self.process_row(line, raw, &mapping, &env, &mut state).await;

                progress.emit(ProgressEvent {
                    phase: if flushed {
                        ImportPhase::Saving
                    } else {
                        ImportPhase::Validating
                    },
                    current: line,
                    total,
                    message: format!("Processando linha {} de {}", line, total),
                    live_item: state.report_rows.last().map(RowOutcome::to_live_item),
                });

                if (offset + 1) % settings.yield_every == 0 {
                    self.scheduler.yield_now().await;
                    if line < total && cancel.is_cancelled() {
                        cancelled = true;
                        break 'chunks;
                    }
                }
            }

            self.scheduler.yield_now().await;
        }

        // === 步骤 6: 刷新剩余批次（取消时同样刷新）===
        if state.writer.pending_len() > 0 {
            debug!(pending = state.writer.pending_len(), "步骤 6: 刷新剩余批次");
            self.flush(&mut state).await;
        }

        if cancelled {
            warn!(
                processed = state.report_rows.len(),
                total_rows = total,
                "导入已取消，返回部分结果"
            );
        }

        // === 步骤 7: 汇总 ===
        let summary = state.into_summary(SummaryMeta {
            run_id,
            policy,
            total_rows_in_file,
            truncated,
            cancelled,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        info!(
            created = summary.counters.created,
            updated = summary.counters.updated,
            merged = summary.counters.merged,
            duplicate_skipped = summary.counters.duplicate_skipped,
            ignored = summary.counters.ignored,
            technical_errors = summary.counters.technical_errors,
            with_pending = summary.with_pending,
            elapsed_ms = summary.elapsed_ms,
            "导入完成"
        );

        Ok(summary)
    }

    #[instrument(skip(self, row))]
    async fn import_single_record(
        &self,
        row: CanonicalRow,
        policy: ConflictPolicy,
    ) -> ImportResult<ImportSummary> {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let settings = self.load_settings().await?;
        let ctx = ValidationContext::new(Utc::now().date_naive(), settings.minor_age_threshold);
        let mut state = RunState::new(1, 1);
        let line = 1;

        if !self.row_validator.has_minimum_signal(&row) {
            state.record(RunState::outcome(
                line,
                &row,
                RowStatus::Ignored,
                Some(IGNORED_REASON.to_string()),
            ));
        } else {
            let validation = self.row_validator.validate(&row, &ctx);
            state.push_errors(RowRef::Line(line), validation.real_errors.clone());

            let result = match self.find_existing(&row, policy).await {
                Ok(Some(id)) => self.update_existing(&id, &row, &validation, policy).await,
                Ok(None) => self
                    .create_single(&row, &validation, &mut state.placeholders)
                    .await
                    .map(|_| RowStatus::Created),
                Err(e) => Err(e),
            };

            match result {
                Ok(status) => state.record(RunState::persisted(line, &row, status, &validation)),
                Err(RepositoryError::DuplicateKey { tax_id }) => state.record(RunState::outcome(
                    line,
                    &row,
                    RowStatus::DuplicateSkipped,
                    Some(format!("CPF já cadastrado: {}", tax_id)),
                )),
                Err(e) => {
                    warn!(error = %e, "单条导入失败");
                    state.record_technical_error(line, &row, e.to_string());
                }
            }
        }

        let summary = state.into_summary(SummaryMeta {
            run_id,
            policy,
            total_rows_in_file: 1,
            truncated: false,
            cancelled: false,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        info!(status = ?summary.report_rows.first().map(|r| r.status), "单条导入完成");

        Ok(summary)
    }
}

// ==========================================
// RowEnv - 单次运行内不变的行处理上下文
// ==========================================
struct RowEnv<'a> {
    policy: ConflictPolicy,
    ctx: ValidationContext,
    index: &'a KeyIndex,
}

struct SummaryMeta {
    run_id: String,
    policy: ConflictPolicy,
    total_rows_in_file: usize,
    truncated: bool,
    cancelled: bool,
    elapsed_ms: u64,
}

// ==========================================
// RunState - 单次运行的可变累计状态
// ==========================================
// 不变量: report_rows[line - 1] 即第 line 行的结果
struct RunState {
    counters: ImportCounters,
    report_rows: Vec<RowOutcome>,
    errors: Vec<RowErrorEntry>,
    placeholders: PlaceholderTaxIds,
    writer: BatchWriter,
}

impl RunState {
    fn new(capacity: usize, batch_size: usize) -> Self {
        Self {
            counters: ImportCounters::default(),
            report_rows: Vec::with_capacity(capacity),
            errors: Vec::new(),
            placeholders: PlaceholderTaxIds::new(),
            writer: BatchWriter::new(batch_size),
        }
    }

    fn outcome(
        line: usize,
        row: &CanonicalRow,
        status: RowStatus,
        reason: Option<String>,
    ) -> RowOutcome {
        RowOutcome {
            line,
            name: row.display_name(line),
            tax_id: row.tax_id.clone(),
            status,
            reason,
            pending_fields: Vec::new(),
        }
    }

    /// 落库类结果：携带待补字段，警告与格式错误写入原因列
    fn persisted(
        line: usize,
        row: &CanonicalRow,
        status: RowStatus,
        validation: &ValidationOutcome,
    ) -> RowOutcome {
        let notes: Vec<&str> = validation
            .real_errors
            .iter()
            .chain(validation.warnings.iter())
            .map(String::as_str)
            .collect();

        let mut outcome =
            Self::outcome(line, row, status, (!notes.is_empty()).then(|| notes.join("; ")));
        outcome.pending_fields = validation.pending_fields.clone();
        outcome
    }

    fn record(&mut self, outcome: RowOutcome) {
        self.counters.record(outcome.status);
        self.report_rows.push(outcome);
    }

    fn record_technical_error(&mut self, line: usize, row: &CanonicalRow, message: String) {
        self.push_errors(RowRef::Line(line), vec![message.clone()]);
        self.record(Self::outcome(
            line,
            row,
            RowStatus::TechnicalError,
            Some(message),
        ));
    }

    /// 追加错误明细（同一归属的相邻条目合并）
    fn push_errors(&mut self, row: RowRef, messages: Vec<String>) {
        if messages.is_empty() {
            return;
        }
        match self.errors.last_mut() {
            Some(last) if last.row == row => last.errors.extend(messages),
            _ => self.errors.push(RowErrorEntry {
                row,
                errors: messages,
            }),
        }
    }

    /// 应用批量刷新结果：CREATED 改判为重复跳过或技术错误
    fn apply_flush(&mut self, report: FlushReport) {
        for (line, tax_id) in &report.duplicates {
            self.reclassify(
                *line,
                RowStatus::DuplicateSkipped,
                format!("CPF já cadastrado: {}", tax_id),
            );
        }

        if let Some(failure) = &report.failure {
            let reason = format!("Falha ao gravar lote {}: {}", report.batch_number, failure);
            for line in &report.failed_lines {
                self.reclassify(*line, RowStatus::TechnicalError, reason.clone());
            }
            self.push_errors(RowRef::batch(report.batch_number), vec![failure.clone()]);
        }
    }

    fn reclassify(&mut self, line: usize, to: RowStatus, reason: String) {
        let Some(outcome) = line
            .checked_sub(1)
            .and_then(|idx| self.report_rows.get_mut(idx))
        else {
            return;
        };
        if outcome.status != RowStatus::Created {
            return;
        }

        self.counters.reclassify(RowStatus::Created, to);
        outcome.status = to;
        outcome.reason = Some(reason);
        outcome.pending_fields.clear();
    }

    fn into_summary(self, meta: SummaryMeta) -> ImportSummary {
        let with_pending = self
            .report_rows
            .iter()
            .filter(|row| row.status.is_persisted() && row.has_pending())
            .count();

        ImportSummary {
            run_id: meta.run_id,
            policy: meta.policy,
            counters: self.counters,
            with_pending,
            truncated: meta.truncated,
            total_rows_in_file: meta.total_rows_in_file,
            processed_rows: self.report_rows.len(),
            cancelled: meta.cancelled,
            elapsed_ms: meta.elapsed_ms,
            report_rows: self.report_rows,
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::patient::{LookupKey, PatientPayload, PatientUpdate, RecordKey};
    use crate::importer::progress::{CollectingProgress, InlineScheduler, NeverCancel};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        keys: Vec<RecordKey>,
        created: Mutex<Vec<PatientPayload>>,
        updates: Mutex<Vec<(String, PatientUpdate)>>,
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn load_key_index(&self) -> RepositoryResult<Vec<RecordKey>> {
            Ok(self.keys.clone())
        }

        async fn find_by_key(&self, key: &LookupKey) -> RepositoryResult<Option<String>> {
            Ok(self
                .keys
                .iter()
                .find(|k| match key {
                    LookupKey::TaxId(v) => k.tax_id.as_deref() == Some(v.as_str()),
                    LookupKey::RecordNumber(v) => k.record_number.as_deref() == Some(v.as_str()),
                })
                .map(|k| k.id.clone()))
        }

        async fn create(&self, payload: &PatientPayload) -> RepositoryResult<String> {
            let mut created = self.created.lock().unwrap();
            created.push(payload.clone());
            Ok(format!("novo-{}", created.len()))
        }

        async fn batch_create(
            &self,
            payloads: &[PatientPayload],
        ) -> RepositoryResult<Vec<String>> {
            let mut created = self.created.lock().unwrap();
            let start = created.len();
            created.extend_from_slice(payloads);
            Ok((0..payloads.len())
                .map(|i| format!("novo-{}", start + i + 1))
                .collect())
        }

        async fn update(&self, id: &str, update: &PatientUpdate) -> RepositoryResult<()> {
            self.updates
                .lock()
                .unwrap()
                .push((id.to_string(), update.clone()));
            Ok(())
        }
    }

    fn settings(batch_size: usize, chunk_size: usize) -> ImportSettings {
        ImportSettings {
            batch_size,
            chunk_size,
            yield_every: 2,
            ..ImportSettings::default()
        }
    }

    fn importer(
        store: Arc<FakeStore>,
        config: ImportSettings,
    ) -> PatientImporterImpl<FakeStore, ImportSettings> {
        PatientImporterImpl::with_default_components(store, config)
            .with_scheduler(Box::new(InlineScheduler))
    }

    fn table(rows: &[(&str, &str)]) -> RawTable {
        RawTable {
            headers: vec!["Nome".to_string(), "CPF".to_string()],
            rows: rows
                .iter()
                .map(|(name, cpf)| {
                    let mut row: RawRow = HashMap::new();
                    row.insert("Nome".to_string(), name.to_string());
                    row.insert("CPF".to_string(), cpf.to_string());
                    row
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_mixed_rows_reconcile() {
        let store = Arc::new(FakeStore {
            keys: vec![RecordKey {
                id: "p-1".to_string(),
                tax_id: Some("52998224725".to_string()),
                record_number: None,
            }],
            ..Default::default()
        });
        let importer = importer(store.clone(), settings(2, 2));
        let progress = CollectingProgress::new();

        let summary = importer
            .import_rows(
                table(&[
                    ("Ana Lima", "529.982.247-25"),
                    ("", ""),
                    ("Bruno Souza", "11144477735"),
                ]),
                ConflictPolicy::Merge,
                &progress,
                &NeverCancel,
            )
            .await
            .unwrap();

        assert!(summary.is_reconciled());
        assert_eq!(summary.counters.merged, 1);
        assert_eq!(summary.counters.ignored, 1);
        assert_eq!(summary.counters.created, 1);
        assert_eq!(summary.report_rows[1].status, RowStatus::Ignored);
        assert_eq!(store.updates.lock().unwrap()[0].0, "p-1");
        assert_eq!(store.updates.lock().unwrap()[0].1.mode, UpdateMode::Merge);
        assert_eq!(store.created.lock().unwrap().len(), 1);

        let currents: Vec<usize> = progress.events().iter().map(|e| e.current).collect();
        assert_eq!(currents, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_update_by_id_classifies_updated() {
        let store = Arc::new(FakeStore {
            keys: vec![RecordKey {
                id: "p-9".to_string(),
                tax_id: Some("11144477735".to_string()),
                record_number: None,
            }],
            ..Default::default()
        });
        let importer = importer(store.clone(), settings(10, 10));

        let summary = importer
            .import_rows(
                table(&[("Bruno", "111.444.777-35")]),
                ConflictPolicy::UpdateById,
                &CollectingProgress::new(),
                &NeverCancel,
            )
            .await
            .unwrap();

        assert_eq!(summary.counters.updated, 1);
        assert_eq!(store.updates.lock().unwrap()[0].1.mode, UpdateMode::Replace);
    }

    #[tokio::test]
    async fn test_invalid_tax_id_is_reported_but_imported() {
        let store = Arc::new(FakeStore::default());
        let importer = importer(store.clone(), settings(10, 10));

        let summary = importer
            .import_rows(
                table(&[("Carla", "52998224724")]),
                ConflictPolicy::Create,
                &CollectingProgress::new(),
                &NeverCancel,
            )
            .await
            .unwrap();

        assert_eq!(summary.counters.created, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].row, RowRef::Line(1));
        assert!(summary.report_rows[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("CPF inválido"));
        assert!(summary.with_pending >= 1);
    }

    #[tokio::test]
    async fn test_single_record_uses_lookup_plan() {
        let store = Arc::new(FakeStore {
            keys: vec![RecordKey {
                id: "p-3".to_string(),
                tax_id: None,
                record_number: Some("PR-77".to_string()),
            }],
            ..Default::default()
        });
        let importer = importer(store.clone(), settings(10, 10));
        let row = CanonicalRow {
            full_name: Some("Davi".to_string()),
            record_number: Some("PR-77".to_string()),
            ..Default::default()
        };

        let summary = importer
            .import_single_record(row, ConflictPolicy::UpdateByReference)
            .await
            .unwrap();

        assert_eq!(summary.counters.updated, 1);
        assert_eq!(summary.processed_rows, 1);
        assert_eq!(store.updates.lock().unwrap()[0].0, "p-3");
    }

    #[tokio::test]
    async fn test_single_record_without_signal_is_ignored() {
        let store = Arc::new(FakeStore::default());
        let importer = importer(store.clone(), settings(10, 10));

        let summary = importer
            .import_single_record(CanonicalRow::default(), ConflictPolicy::Create)
            .await
            .unwrap();

        assert_eq!(summary.counters.ignored, 1);
        assert_eq!(summary.report_rows[0].name, "Linha 1");
        assert!(store.created.lock().unwrap().is_empty());
    }
}
