// ==========================================
// 诊所管理系统 - 数据仓储层
// ==========================================
// 职责: 患者记录存储接口与 SQLite 实现
// 红线: 不含业务规则
// ==========================================

pub mod error;
pub mod record_store;
pub mod record_store_impl;

// 重导出核心类型
pub use error::{RepositoryError, RepositoryResult};
pub use record_store::RecordStore;
pub use record_store_impl::SqliteRecordStore;
