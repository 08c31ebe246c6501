// ==========================================
// 诊所管理系统 - 导入参数快照
// ==========================================
// 职责: 单次运行使用的已解析参数（按值传入编排器）
// 说明: 分块大小与让出间隔只影响响应性，不影响正确性
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub chunk_size: usize,
    pub yield_every: usize,
    pub max_rows: usize,
    pub minor_age_threshold: u32,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: 200,
            chunk_size: 300,
            yield_every: 10,
            max_rows: 10_000,
            minor_age_threshold: 18,
        }
    }
}

impl ImportSettings {
    /// 从配置读取器加载（0 值视为非法，回退为 1）
    pub async fn load<C: ImportConfigReader + ?Sized>(
        reader: &C,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self {
            batch_size: reader.get_batch_size().await?.max(1),
            chunk_size: reader.get_chunk_size().await?.max(1),
            yield_every: reader.get_yield_every().await?.max(1),
            max_rows: reader.get_max_rows().await?.max(1),
            minor_age_threshold: reader.get_minor_age_threshold().await?,
        })
    }
}

// 固定参数读取器（测试与嵌入方直接注入快照）
#[async_trait]
impl ImportConfigReader for ImportSettings {
    async fn get_batch_size(&self) -> Result<usize, Box<dyn Error + Send + Sync>> {
        Ok(self.batch_size)
    }

    async fn get_chunk_size(&self) -> Result<usize, Box<dyn Error + Send + Sync>> {
        Ok(self.chunk_size)
    }

    async fn get_yield_every(&self) -> Result<usize, Box<dyn Error + Send + Sync>> {
        Ok(self.yield_every)
    }

    async fn get_max_rows(&self) -> Result<usize, Box<dyn Error + Send + Sync>> {
        Ok(self.max_rows)
    }

    async fn get_minor_age_threshold(&self) -> Result<u32, Box<dyn Error + Send + Sync>> {
        Ok(self.minor_age_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_clamps_zero_values() {
        let raw = ImportSettings {
            batch_size: 0,
            chunk_size: 0,
            yield_every: 0,
            max_rows: 5,
            minor_age_threshold: 16,
        };

        let loaded = ImportSettings::load(&raw).await.unwrap();

        assert_eq!(loaded.batch_size, 1);
        assert_eq!(loaded.chunk_size, 1);
        assert_eq!(loaded.yield_every, 1);
        assert_eq!(loaded.max_rows, 5);
        assert_eq!(loaded.minor_age_threshold, 16);
    }
}
