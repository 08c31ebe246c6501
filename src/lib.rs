// ==========================================
// 诊所管理系统 - 患者批量导入核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 表格文件 → 患者档案的批量导入管道
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 导入参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ConflictPolicy, ImportPhase, PendingField, RowStatus};

// 领域实体
pub use domain::{CanonicalRow, ImportCounters, ImportSummary, PatientPayload, RowOutcome};

// 导入器
pub use importer::{PatientImporter, PatientImporterImpl, ReportBuilder};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "诊所管理系统 - 患者批量导入";
