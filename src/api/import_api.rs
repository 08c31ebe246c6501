// ==========================================
// 诊所管理系统 - 患者导入 API
// ==========================================
// 职责: 预检 → 按文件类型分派（CSV / Excel / JSON 信封）→ 导出报告
// 说明: 预检失败以 Err 返回；逐行处理开始后的失败全部体现在汇总中
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::db::open_sqlite_connection;
use crate::domain::import::ImportSummary;
use crate::domain::types::ConflictPolicy;
use crate::importer::{
    CancellationCheck, FieldMapperImpl, JsonEnvelopeParser, PatientImporter,
    PatientImporterImpl, ProgressSink, ReportBuilder, SourceKind,
};
use crate::repository::SqliteRecordStore;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

type SqliteImporter = PatientImporterImpl<SqliteRecordStore, ConfigManager>;

/// 导入 API
pub struct ImportApi {
    db_path: String,
}

impl ImportApi {
    /// 创建新的 ImportApi 实例
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// 导入患者文件
    ///
    /// # 参数
    /// - file_path: .csv / .xlsx / .xls / .json 文件路径
    /// - policy: 冲突策略字符串（create / update_by_id / update_by_reference / merge）
    /// - progress: 进度回调
    /// - cancel: 取消判定
    ///
    /// # 返回
    /// - Ok(ImportSummary): 运行汇总
    /// - Err(ApiError): 预检失败
    #[instrument(skip(self, progress, cancel))]
    pub async fn import_patients(
        &self,
        file_path: &str,
        policy: &str,
        progress: &dyn ProgressSink,
        cancel: &dyn CancellationCheck,
    ) -> ApiResult<ImportSummary> {
        // 1. 参数预检
        if file_path.trim().is_empty() {
            return Err(ApiError::InvalidInput("文件路径不能为空".to_string()));
        }
        let policy: ConflictPolicy = policy.parse().map_err(ApiError::InvalidInput)?;
        let path = Path::new(file_path);
        let kind = SourceKind::from_path(path)?;
        if !path.is_file() {
            return Err(ApiError::NotFound(format!("文件不存在: {}", file_path)));
        }

        // 2. 装配导入器
        let importer = self.create_importer()?;

        // 3. 按类型分派
        let summary = match kind {
            SourceKind::Csv | SourceKind::Spreadsheet => {
                importer.import_file(path, policy, progress, cancel).await?
            }
            SourceKind::JsonEnvelope => {
                let envelope = JsonEnvelopeParser.parse_file(path)?;
                let row = FieldMapperImpl::new().normalize_envelope(&envelope.patient);
                importer.import_single_record(row, policy).await?
            }
        };

        info!(
            run_id = %summary.run_id,
            processed = summary.processed_rows,
            truncated = summary.truncated,
            cancelled = summary.cancelled,
            "患者导入完成"
        );
        Ok(summary)
    }

    /// 导出行级报告（linha,nome,cpf,status,motivo）
    pub fn export_report(&self, summary: &ImportSummary, output_path: &str) -> ApiResult<()> {
        if output_path.trim().is_empty() {
            return Err(ApiError::InvalidInput("报告路径不能为空".to_string()));
        }
        ReportBuilder::from_summary(summary).write_to(Path::new(output_path))?;
        Ok(())
    }

    /// 创建导入器（存储与配置共享同一连接）
    fn create_importer(&self) -> ApiResult<SqliteImporter> {
        let conn = open_sqlite_connection(&self.db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        let conn = Arc::new(Mutex::new(conn));

        let store = SqliteRecordStore::from_connection(conn.clone())?;
        let config = ConfigManager::from_connection(conn)
            .map_err(|e| ApiError::DatabaseError(format!("创建配置管理器失败: {}", e)))?;

        Ok(PatientImporterImpl::with_default_components(
            Arc::new(store),
            config,
        ))
    }
}
