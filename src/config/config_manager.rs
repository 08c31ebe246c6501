// ==========================================
// 诊所管理系统 - 配置管理器
// ==========================================
// 职责: 导入参数的加载与覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::config::import_settings::ImportSettings;
use crate::db::{init_schema, open_sqlite_connection};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

type ConfigError = Box<dyn Error + Send + Sync>;

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    pub const BATCH_SIZE: &str = "import/batch_size";
    pub const CHUNK_SIZE: &str = "import/chunk_size";
    pub const YIELD_EVERY: &str = "import/yield_every";
    pub const MAX_ROWS: &str = "import/max_rows";
    pub const MINOR_AGE_THRESHOLD: &str = "import/minor_age_threshold";
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
            init_schema(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取并解析配置值，缺失时返回默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| {
                ConfigError::from(format!(
                    "配置值格式错误 (key: {}, value: {}): {}",
                    key, raw, e
                ))
            }),
        }
    }

    /// 写入 global scope 的配置值
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有导入配置的快照
    pub fn get_config_snapshot(&self) -> Result<HashMap<String, String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' AND key LIKE 'import/%' ORDER BY key",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_batch_size(&self) -> Result<usize, ConfigError> {
        let defaults = ImportSettings::default();
        self.get_parsed_or_default(config_keys::BATCH_SIZE, defaults.batch_size)
    }

    async fn get_chunk_size(&self) -> Result<usize, ConfigError> {
        let defaults = ImportSettings::default();
        self.get_parsed_or_default(config_keys::CHUNK_SIZE, defaults.chunk_size)
    }

    async fn get_yield_every(&self) -> Result<usize, ConfigError> {
        let defaults = ImportSettings::default();
        self.get_parsed_or_default(config_keys::YIELD_EVERY, defaults.yield_every)
    }

    async fn get_max_rows(&self) -> Result<usize, ConfigError> {
        let defaults = ImportSettings::default();
        self.get_parsed_or_default(config_keys::MAX_ROWS, defaults.max_rows)
    }

    async fn get_minor_age_threshold(&self) -> Result<u32, ConfigError> {
        let defaults = ImportSettings::default();
        self.get_parsed_or_default(config_keys::MINOR_AGE_THRESHOLD, defaults.minor_age_threshold)
    }
}
