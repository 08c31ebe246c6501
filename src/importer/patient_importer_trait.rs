// ==========================================
// 诊所管理系统 - 患者导入 Trait
// ==========================================
// 职责: 定义导入管道各组件接口（不包含实现）
// 流程: 解析 → 表头映射 → 行标准化 → 校验 → 冲突匹配 → 载荷构建 → 落库 → 报告
// ==========================================

use crate::domain::import::{ImportSummary, ValidationOutcome};
use crate::domain::patient::{
    CanonicalRow, FieldKey, LookupKey, PatientPayload, PatientUpdate, UpdateMode,
};
use crate::domain::types::ConflictPolicy;
use crate::importer::conflict_handler::KeyIndex;
use crate::importer::dq_validator::ValidationContext;
use crate::importer::error::ImportResult;
use crate::importer::field_mapper::HeaderMapping;
use crate::importer::file_parser::{RawRow, RawTable};
use crate::importer::progress::{CancellationCheck, ProgressSink};
use crate::importer::tax_id::PlaceholderTaxIds;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::Path;

// ==========================================
// PatientImporter Trait
// ==========================================
// 用途: 患者批量导入主接口
// 实现者: PatientImporterImpl
#[async_trait]
pub trait PatientImporter: Send + Sync {
    /// 从文件导入（按扩展名分派 CSV / Excel）
    ///
    /// # 返回
    /// - Ok(ImportSummary): 运行汇总（取消时 cancelled = true）
    /// - Err: 仅预检类错误（文件不存在、格式不支持、无法读取）
    async fn import_file(
        &self,
        file_path: &Path,
        policy: ConflictPolicy,
        progress: &dyn ProgressSink,
        cancel: &dyn CancellationCheck,
    ) -> ImportResult<ImportSummary>;

    /// 导入已解析的原始表
    ///
    /// # 说明
    /// - 表头映射每个文件只计算一次
    /// - 逐行处理开始后不再返回 Err，行级失败进入报告
    async fn import_rows(
        &self,
        table: RawTable,
        policy: ConflictPolicy,
        progress: &dyn ProgressSink,
        cancel: &dyn CancellationCheck,
    ) -> ImportResult<ImportSummary>;

    /// 导入单条记录（JSON 信封路径，不经过分块管道）
    async fn import_single_record(
        &self,
        row: CanonicalRow,
        policy: ConflictPolicy,
    ) -> ImportResult<ImportSummary>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口
// 实现者: CsvParser, ExcelParser
pub trait FileParser: Send + Sync {
    /// 解析文件为原始表（表头顺序 + 行记录）
    fn parse_to_raw_table(&self, file_path: &Path) -> ImportResult<RawTable>;
}

// ==========================================
// FieldAliasResolver Trait
// ==========================================
// 用途: 表头 → 标准字段映射
// 实现者: FieldMapper
pub trait FieldAliasResolver: Send + Sync {
    /// 表头标准化（小写 / 去重音 / 标点折叠 / "nº" 等编号写法统一）
    fn normalize_header(&self, header: &str) -> String;

    /// 单个表头解析为标准字段；未命中时返回 slug 临时键
    fn resolve_header(&self, header: &str) -> FieldKey;

    /// 基于全部表头构建映射（每个文件一次）
    fn build_mapping(&self, headers: &[String]) -> HeaderMapping;
}

// ==========================================
// RowNormalizer Trait
// ==========================================
// 用途: 原始行 → 标准行
// 实现者: FieldMapper
pub trait RowNormalizer: Send + Sync {
    /// 按映射生成标准行（多列同字段时首个非空值胜出）
    fn normalize_row(&self, mapping: &HeaderMapping, row: &RawRow) -> CanonicalRow;
}

// ==========================================
// DataCleaner Trait
// ==========================================
// 用途: 字段值清洗
// 实现者: DataCleaner
pub trait DataCleaner: Send + Sync {
    /// 清洗文本字段（TRIM + 压缩空白，可选转大写）
    fn clean_text(&self, value: &str, uppercase: bool) -> String;

    /// 标准化 NULL 值（空字符串/空白 → None）
    fn normalize_null(&self, value: Option<String>) -> Option<String>;

    /// 仅保留数字字符
    fn digits_only(&self, value: &str) -> String;

    /// 去除重音符号
    fn fold_diacritics(&self, value: &str) -> String;

    /// 解析日期（巴西常见格式 / ISO / 电子表格序列值）
    ///
    /// # 返回
    /// - Some(NaiveDate): 解析成功
    /// - None: 空值或无法识别
    fn parse_date(&self, value: &str) -> Option<NaiveDate>;
}

// ==========================================
// RowValidator Trait
// ==========================================
// 用途: 单行校验（不抛错）
// 实现者: DqValidator
pub trait RowValidator: Send + Sync {
    /// 最低识别信号: 姓名 / 11 位 CPF / ≥10 位电话 任一
    fn has_minimum_signal(&self, row: &CanonicalRow) -> bool;

    /// 计算警告、格式错误与待补字段
    ///
    /// # 参数
    /// - ctx: 基准日期与未成年阈值
    fn validate(&self, row: &CanonicalRow, ctx: &ValidationContext) -> ValidationOutcome;
}

// ==========================================
// ConflictResolver Trait
// ==========================================
// 用途: 按冲突策略匹配已有档案
// 实现者: ConflictHandler
pub trait ConflictResolver: Send + Sync {
    /// 按策略给出有序的精确匹配键（create 策略为空）
    fn lookup_plan(&self, row: &CanonicalRow, policy: ConflictPolicy) -> Vec<LookupKey>;

    /// 在键快照中匹配
    ///
    /// # 返回
    /// - Some(id): 命中的已有档案
    /// - None: 视为新档案
    fn resolve(&self, row: &CanonicalRow, policy: ConflictPolicy, index: &KeyIndex)
        -> Option<String>;
}

// ==========================================
// PayloadBuilder Trait
// ==========================================
// 用途: 标准行 → 存储载荷
// 实现者: PatientPayloadBuilder
pub trait PayloadBuilder: Send + Sync {
    /// 构建新建载荷（缺失 CPF 时写入占位值）
    fn build_create(
        &self,
        row: &CanonicalRow,
        outcome: &ValidationOutcome,
        placeholders: &mut PlaceholderTaxIds,
    ) -> PatientPayload;

    /// 构建更新补丁（仅包含行内有值的字段组）
    fn build_update(
        &self,
        row: &CanonicalRow,
        outcome: &ValidationOutcome,
        mode: UpdateMode,
    ) -> PatientUpdate;
}
