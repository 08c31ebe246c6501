// ==========================================
// 诊所管理系统 - 患者记录存储 Trait
// ==========================================
// 职责: 定义导入管道依赖的存储接口（不包含实现）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::patient::{LookupKey, PatientPayload, PatientUpdate, RecordKey};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// RecordStore Trait
// ==========================================
// 用途: 导入管道唯一的共享可变资源，以注入方式传入
// 实现者: SqliteRecordStore（rusqlite），测试中的内存假实现
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 读取已有档案的键快照（id / CPF / 档案号）
    ///
    /// # 用途
    /// - 运行开始时读取一次，冲突解析在内存快照上同步完成
    async fn load_key_index(&self) -> RepositoryResult<Vec<RecordKey>>;

    /// 按键精确查找档案 ID
    ///
    /// # 返回
    /// - Ok(Some(id)): 找到（多条时取第一条）
    /// - Ok(None): 未找到
    async fn find_by_key(&self, key: &LookupKey) -> RepositoryResult<Option<String>>;

    /// 新建单条档案
    ///
    /// # 返回
    /// - Ok(id): 新档案 ID
    /// - Err(DuplicateKey): CPF 已存在
    async fn create(&self, payload: &PatientPayload) -> RepositoryResult<String>;

    /// 批量新建（原子：全部成功或全部回滚）
    ///
    /// # 返回
    /// - Ok(ids): 与输入顺序一致的新档案 ID
    /// - Err(DuplicateKey { tax_id }): 某条载荷 CPF 冲突，整批未写入
    /// - Err(_): 其他失败，整批未写入
    async fn batch_create(&self, payloads: &[PatientPayload]) -> RepositoryResult<Vec<String>>;

    /// 更新已有档案（按字段组应用补丁）
    async fn update(&self, id: &str, update: &PatientUpdate) -> RepositoryResult<()>;
}
