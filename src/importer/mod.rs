// ==========================================
// 诊所管理系统 - 导入层
// ==========================================
// 职责: 表格 / JSON 信封 → 患者档案批量导入
// 支持: CSV, Excel（首个工作表）, 单条 JSON 信封
// ==========================================

// 模块声明
pub mod batch_writer;
pub mod conflict_handler;
pub mod data_cleaner;
pub mod dq_validator;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod patient_importer_impl;
pub mod patient_importer_trait;
pub mod payload_builder;
pub mod progress;
pub mod report;
pub mod tax_id;

// 重导出核心类型
pub use batch_writer::{BatchWriter, FlushReport};
pub use conflict_handler::{ConflictHandler as ConflictHandlerImpl, KeyIndex};
pub use data_cleaner::DataCleaner as DataCleanerImpl;
pub use dq_validator::{DqValidator as DqValidatorImpl, ValidationContext};
pub use error::{ImportError, ImportResult};
pub use field_mapper::{FieldMapper as FieldMapperImpl, HeaderMapping};
pub use file_parser::{
    CsvParser, ExcelParser, JsonEnvelopeParser, PatientEnvelope, RawRow, RawTable, SourceKind,
    UniversalFileParser,
};
pub use patient_importer_impl::PatientImporterImpl;
pub use payload_builder::PatientPayloadBuilder;
pub use progress::{
    CancelFlag, CancellationCheck, CollectingProgress, InlineScheduler, NeverCancel,
    NoopProgress, ProgressSink, Scheduler, TokioScheduler, TracingProgress,
};
pub use report::ReportBuilder;
pub use tax_id::{is_valid_tax_id, PlaceholderTaxIds};

// 重导出 Trait 接口
pub use patient_importer_trait::{
    ConflictResolver, DataCleaner, FieldAliasResolver, FileParser, PatientImporter,
    PayloadBuilder, RowNormalizer, RowValidator,
};
