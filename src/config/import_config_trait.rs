// ==========================================
// 诊所管理系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入管道的调度参数
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取批量写入阈值
    ///
    /// # 默认值
    /// - 200
    async fn get_batch_size(&self) -> Result<usize, Box<dyn Error + Send + Sync>>;

    /// 获取分块大小（每块结束处让出调度并检查取消）
    ///
    /// # 默认值
    /// - 300
    async fn get_chunk_size(&self) -> Result<usize, Box<dyn Error + Send + Sync>>;

    /// 获取块内让出间隔（行）
    ///
    /// # 默认值
    /// - 10
    async fn get_yield_every(&self) -> Result<usize, Box<dyn Error + Send + Sync>>;

    /// 获取单次运行行数上限（超出部分截断）
    ///
    /// # 默认值
    /// - 10000
    async fn get_max_rows(&self) -> Result<usize, Box<dyn Error + Send + Sync>>;

    /// 获取未成年年龄阈值（低于此年龄需要责任人信息）
    ///
    /// # 默认值
    /// - 18
    async fn get_minor_age_threshold(&self) -> Result<u32, Box<dyn Error + Send + Sync>>;
}
