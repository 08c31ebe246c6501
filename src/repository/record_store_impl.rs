// ==========================================
// 诊所管理系统 - 患者记录存储实现
// ==========================================
// 职责: 以 SQLite 文档表实现 RecordStore（rusqlite）
// 存储: patient 表，document 列保存 PatientPayload JSON
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::patient::{LookupKey, PatientPayload, PatientUpdate, RecordKey};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::RecordStore;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

// ==========================================
// SqliteRecordStore
// ==========================================
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// 创建新的存储实例（自动建表）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（与 ConfigManager 共享连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = lock(&conn)?;
            init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 按 ID 读取文档
    pub fn get(&self, id: &str) -> RepositoryResult<Option<PatientPayload>> {
        let conn = lock(&self.conn)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT document FROM patient WHERE patient_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// 统计档案数
    pub fn count(&self) -> RepositoryResult<usize> {
        let conn = lock(&self.conn)?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM patient", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// 插入单条文档（调用方负责事务）
    fn insert_patient(conn: &Connection, payload: &PatientPayload) -> RepositoryResult<String> {
        let tax_id = payload
            .tax_id()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RepositoryError::FieldValueError {
                field: "tax_id".to_string(),
                message: "CPF obrigatório para criação".to_string(),
            })?
            .to_string();

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let document = serde_json::to_string(payload)?;

        conn.execute(
            r#"
            INSERT INTO patient (
                patient_id, tax_id, record_number, full_name, document, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
            params![
                id,
                tax_id,
                payload.record.record_number,
                payload.profile.full_name,
                document,
                now,
            ],
        )
        .map_err(|e| map_unique_error(e, &tax_id))?;

        Ok(id)
    }
}

/// 获取连接锁
fn lock(conn: &Arc<Mutex<Connection>>) -> RepositoryResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| RepositoryError::LockError(e.to_string()))
}

/// tax_id 唯一约束违反 → DuplicateKey
fn map_unique_error(err: rusqlite::Error, tax_id: &str) -> RepositoryError {
    match &err {
        rusqlite::Error::SqliteFailure(_, Some(msg))
            if msg.contains("UNIQUE") && msg.contains("tax_id") =>
        {
            RepositoryError::DuplicateKey {
                tax_id: tax_id.to_string(),
            }
        }
        _ => RepositoryError::from(err),
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn load_key_index(&self) -> RepositoryResult<Vec<RecordKey>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT patient_id, tax_id, record_number FROM patient ORDER BY created_at, patient_id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(RecordKey {
                id: row.get(0)?,
                tax_id: row.get(1)?,
                record_number: row.get(2)?,
            })
        })?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        debug!(count = keys.len(), "已加载档案键快照");
        Ok(keys)
    }

    async fn find_by_key(&self, key: &LookupKey) -> RepositoryResult<Option<String>> {
        let conn = lock(&self.conn)?;
        let (sql, value) = match key {
            LookupKey::TaxId(v) => (
                "SELECT patient_id FROM patient WHERE tax_id = ?1 ORDER BY created_at LIMIT 1",
                v,
            ),
            LookupKey::RecordNumber(v) => (
                "SELECT patient_id FROM patient WHERE record_number = ?1 ORDER BY created_at LIMIT 1",
                v,
            ),
        };

        let id = conn
            .query_row(sql, params![value], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(id)
    }

    async fn create(&self, payload: &PatientPayload) -> RepositoryResult<String> {
        let conn = lock(&self.conn)?;
        Self::insert_patient(&conn, payload)
    }

    /// 批量新建（事务化，任一失败整批回滚）
    async fn batch_create(&self, payloads: &[PatientPayload]) -> RepositoryResult<Vec<String>> {
        let conn = lock(&self.conn)?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            // 出错时 tx 被 drop，自动回滚
            ids.push(Self::insert_patient(&tx, payload)?);
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(ids)
    }

    async fn update(&self, id: &str, update: &PatientUpdate) -> RepositoryResult<()> {
        let conn = lock(&self.conn)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT document FROM patient WHERE patient_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let raw = raw.ok_or_else(|| RepositoryError::NotFound {
            entity: "patient".to_string(),
            id: id.to_string(),
        })?;

        let mut payload: PatientPayload = serde_json::from_str(&raw)?;
        payload.apply_update(update);

        let tax_id = payload.tax_id().unwrap_or_default().to_string();
        let document = serde_json::to_string(&payload)?;

        conn.execute(
            r#"
            UPDATE patient
            SET tax_id = ?2, record_number = ?3, full_name = ?4, document = ?5, updated_at = ?6
            WHERE patient_id = ?1
            "#,
            params![
                id,
                tax_id,
                payload.record.record_number,
                payload.profile.full_name,
                document,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| map_unique_error(e, &tax_id))?;

        Ok(())
    }
}
