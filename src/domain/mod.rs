// ==========================================
// 诊所管理系统 - 领域模型层
// ==========================================
// 职责: 定义导入管道的实体与类型
// 红线: 不含数据访问逻辑，不含管道编排逻辑
// ==========================================

pub mod import;
pub mod patient;
pub mod types;

// 重导出核心类型
pub use import::{
    ImportCounters, ImportSummary, LiveItem, ProgressEvent, RowErrorEntry, RowOutcome, RowRef,
    ValidationOutcome,
};
pub use patient::{
    Address, BirthGroup, CanonicalField, CanonicalRow, DocumentsGroup, EducationGroup, FieldKey,
    Insurance, LookupKey, PatientPayload, PatientUpdate, Phone, ProfileGroup, RecordGroup,
    RecordKey, UpdateMode,
};
pub use types::{ConflictPolicy, ImportPhase, LiveItemType, PendingField, RowStatus, Sex};
