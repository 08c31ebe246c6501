// ==========================================
// 诊所管理系统 - 导入报告构建器
// ==========================================
// 职责: 按输入顺序汇总行结果，渲染为分隔文本报告
// 外部契约: 表头固定为 linha,nome,cpf,status,motivo（逐字节保持）
// ==========================================

use crate::domain::import::{ImportSummary, RowOutcome};
use crate::importer::error::{ImportError, ImportResult};
use std::path::Path;
use tracing::info;

pub const REPORT_HEADER: [&str; 5] = ["linha", "nome", "cpf", "status", "motivo"];

pub struct ReportBuilder<'a> {
    rows: &'a [RowOutcome],
}

impl<'a> ReportBuilder<'a> {
    pub fn new(rows: &'a [RowOutcome]) -> Self {
        Self { rows }
    }

    pub fn from_summary(summary: &'a ImportSummary) -> Self {
        Self::new(&summary.report_rows)
    }

    /// 渲染 CSV 文本（逗号分隔，必要时加引号）
    pub fn to_csv(&self) -> ImportResult<String> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(REPORT_HEADER)?;
        for row in self.rows {
            let line = row.line.to_string();
            writer.write_record([
                line.as_str(),
                row.name.as_str(),
                row.tax_id.as_deref().unwrap_or(""),
                row.status.as_str(),
                row.reason.as_deref().unwrap_or(""),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ImportError::ReportError(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ImportError::ReportError(e.to_string()))
    }

    /// 写入报告文件
    pub fn write_to(&self, path: &Path) -> ImportResult<()> {
        let content = self.to_csv()?;
        std::fs::write(path, content)
            .map_err(|e| ImportError::ReportError(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), rows = self.rows.len(), "导入报告已写出");
        Ok(())
    }
}
