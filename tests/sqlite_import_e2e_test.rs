// ==========================================
// SQLite 端到端测试
// ==========================================
// 测试目标: ImportApi → PatientImporterImpl → SqliteRecordStore 全链路
// ==========================================


use clinic_import::config::{config_keys, ConfigManager};
use clinic_import::domain::{LookupKey, RowStatus};
use clinic_import::importer::{CollectingProgress, NeverCancel, NoopProgress};
use clinic_import::logging;
use clinic_import::repository::{RecordStore, SqliteRecordStore};
use clinic_import::{ApiError, ImportApi};
use std::path::PathBuf;
use tempfile::TempDir;
use test_helpers::{patient_row, valid_tax_id, write_csv, PATIENT_HEADERS};

fn setup(rows: usize) -> (TempDir, String, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("clinic.db").to_string_lossy().to_string();
    let data: Vec<Vec<String>> = (1..=rows as u64).map(patient_row).collect();
    let csv_path = write_csv(&dir, "pacientes.csv", &PATIENT_HEADERS, &data).unwrap();
    (dir, db_path, csv_path)
}

#[tokio::test]
async fn test_csv_import_persists_records() {
    logging::init_test();
    let (_dir, db_path, csv_path) = setup(25);
    let api = ImportApi::new(db_path.clone());
    let progress = CollectingProgress::new();

    let summary = api
        .import_patients(csv_path.to_str().unwrap(), "create", &progress, &NeverCancel)
        .await
        .unwrap();

    assert_eq!(summary.counters.created, 25);
    assert!(summary.is_reconciled());
    assert_eq!(progress.events().len(), 26);

    let store = SqliteRecordStore::new(&db_path).unwrap();
    assert_eq!(store.count().unwrap(), 25);
    let id = store
        .find_by_key(&LookupKey::TaxId(valid_tax_id(3)))
        .await
        .unwrap()
        .expect("record should exist");
    let payload = store.get(&id).unwrap().unwrap();
    assert_eq!(payload.profile.full_name.as_deref(), Some("Paciente 3"));
    assert_eq!(payload.record.record_number.as_deref(), Some("PR-3"));
}

#[tokio::test]
async fn test_reimport_under_each_policy() {
    let (_dir, db_path, csv_path) = setup(10);
    let api = ImportApi::new(db_path.clone());
    let file = csv_path.to_str().unwrap();

    let first = api
        .import_patients(file, "create", &NoopProgress, &NeverCancel)
        .await
        .unwrap();
    assert_eq!(first.counters.created, 10);

    // 再次新建: 全部命中唯一约束
    let second = api
        .import_patients(file, "create", &NoopProgress, &NeverCancel)
        .await
        .unwrap();
    assert_eq!(second.counters.duplicate_skipped, 10);
    assert_eq!(second.counters.created, 0);

    let merged = api
        .import_patients(file, "merge", &NoopProgress, &NeverCancel)
        .await
        .unwrap();
    assert_eq!(merged.counters.merged, 10);
    assert!(merged
        .report_rows
        .iter()
        .all(|r| r.status == RowStatus::Merged));

    let updated = api
        .import_patients(file, "update_by_reference", &NoopProgress, &NeverCancel)
        .await
        .unwrap();
    assert_eq!(updated.counters.updated, 10);

    let store = SqliteRecordStore::new(&db_path).unwrap();
    assert_eq!(store.count().unwrap(), 10);
}

#[tokio::test]
async fn test_config_overrides_are_applied() {
    let (_dir, db_path, csv_path) = setup(12);
    let config = ConfigManager::new(&db_path).unwrap();
    config.set_config_value(config_keys::MAX_ROWS, "5").unwrap();
    config.set_config_value(config_keys::BATCH_SIZE, "2").unwrap();
    drop(config);

    let api = ImportApi::new(db_path.clone());
    let summary = api
        .import_patients(csv_path.to_str().unwrap(), "create", &NoopProgress, &NeverCancel)
        .await
        .unwrap();

    assert!(summary.truncated);
    assert_eq!(summary.total_rows_in_file, 12);
    assert_eq!(summary.processed_rows, 5);
    assert_eq!(summary.counters.created, 5);

    let store = SqliteRecordStore::new(&db_path).unwrap();
    assert_eq!(store.count().unwrap(), 5);
}

#[tokio::test]
async fn test_in_file_duplicate_against_unique_index() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("clinic.db").to_string_lossy().to_string();
    let mut repeated = patient_row(2);
    repeated[0] = "Paciente Repetido".to_string();
    let rows = vec![patient_row(1), patient_row(2), repeated, patient_row(3)];
    let csv_path = write_csv(&dir, "pacientes.csv", &PATIENT_HEADERS, &rows).unwrap();

    let api = ImportApi::new(db_path.clone());
    let summary = api
        .import_patients(csv_path.to_str().unwrap(), "create", &NoopProgress, &NeverCancel)
        .await
        .unwrap();

    assert_eq!(summary.counters.created, 3);
    assert_eq!(summary.counters.duplicate_skipped, 1);
    assert_eq!(summary.report_rows[2].status, RowStatus::DuplicateSkipped);
    assert_eq!(summary.report_rows[2].line, 3);
}

#[tokio::test]
async fn test_export_report_writes_csv() {
    let (dir, db_path, csv_path) = setup(3);
    let api = ImportApi::new(db_path);

    let summary = api
        .import_patients(csv_path.to_str().unwrap(), "create", &NoopProgress, &NeverCancel)
        .await
        .unwrap();
    let report_path = dir.path().join("relatorio.csv");
    api.export_report(&summary, report_path.to_str().unwrap())
        .unwrap();

    let text = std::fs::read_to_string(&report_path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("linha,nome,cpf,status,motivo"));
    assert_eq!(lines.count(), 3);
    assert!(text.contains("Paciente 1"));
    assert!(text.contains("CREATED"));
}

#[tokio::test]
async fn test_api_errors_for_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("clinic.db").to_string_lossy().to_string();
    let api = ImportApi::new(db_path);

    let result = api
        .import_patients("", "create", &NoopProgress, &NeverCancel)
        .await;
    assert!(matches!(result, Err(ApiError::InvalidInput(_))));

    let result = api
        .import_patients("pacientes.csv", "apagar_tudo", &NoopProgress, &NeverCancel)
        .await;
    assert!(matches!(result, Err(ApiError::InvalidInput(_))));
}
