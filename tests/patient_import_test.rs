// ==========================================
// PatientImporter 集成测试
// ==========================================
// 测试目标: 计数对账 / 行级隔离 / 批量失败 / 取消 / 截断 / 进度顺序
// ==========================================


use clinic_import::domain::{ImportPhase, LiveItemType, ProgressEvent, RowRef, RowStatus};
use clinic_import::importer::{
    CancelFlag, CollectingProgress, NeverCancel, PatientImporter, ReportBuilder,
};
use clinic_import::logging;
use clinic_import::ConflictPolicy;
use std::sync::Arc;
use test_helpers::{
    create_test_importer, patient_row, patient_table, raw_table, settings, valid_tax_id,
    write_csv, MemoryRecordStore, PATIENT_HEADERS,
};

fn seed_tax_ids(store: &MemoryRecordStore, tax_ids: &[String]) -> Vec<String> {
    let entries: Vec<(&str, Option<&str>)> = tax_ids.iter().map(|t| (t.as_str(), None)).collect();
    store.seed(&entries)
}

// ==========================================
// 场景 A-C: 计数对账
// ==========================================

#[tokio::test]
async fn test_all_unique_rows_are_created() {
    logging::init_test();

    let store = Arc::new(MemoryRecordStore::new());
    let importer = create_test_importer(store.clone(), settings(200, 300));

    let summary = importer
        .import_rows(
            patient_table(40, 1),
            ConflictPolicy::Create,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .expect("import should succeed");

    assert_eq!(summary.counters.created, 40);
    assert_eq!(summary.counters.updated, 0);
    assert_eq!(summary.counters.merged, 0);
    assert_eq!(summary.counters.duplicate_skipped, 0);
    assert_eq!(summary.counters.ignored, 0);
    assert_eq!(summary.counters.technical_errors, 0);
    assert_eq!(summary.report_rows.len(), 40);
    assert_eq!(summary.total_rows_in_file, 40);
    assert!(summary.is_reconciled());
    assert!(!summary.truncated);
    assert!(!summary.cancelled);
    assert_eq!(store.len(), 40);
}

#[tokio::test]
async fn test_half_existing_tax_ids_under_create_policy() {
    logging::init_test();

    let store = Arc::new(MemoryRecordStore::new());
    // 已有 50 个 CPF，与文件中的偶数行重合
    let existing: Vec<String> = (0..100).step_by(2).map(valid_tax_id).collect();
    seed_tax_ids(&store, &existing);
    let importer = create_test_importer(store.clone(), settings(200, 300));

    let summary = importer
        .import_rows(
            patient_table(100, 0),
            ConflictPolicy::Create,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .unwrap();

    assert_eq!(summary.counters.created, 50);
    assert_eq!(summary.counters.duplicate_skipped, 50);
    assert_eq!(summary.counters.technical_errors, 0);
    assert_eq!(summary.report_rows.len(), 100);
    assert!(summary.is_reconciled());
    assert_eq!(store.len(), 100);

    // 偶数 CPF 序号 → 奇数行号
    for row in &summary.report_rows {
        let expected = if row.line % 2 == 1 {
            RowStatus::DuplicateSkipped
        } else {
            RowStatus::Created
        };
        assert_eq!(row.status, expected, "line {}", row.line);
    }
}

#[tokio::test]
async fn test_first_row_duplicate_is_reported_on_line_one() {
    logging::init_test();

    let store = Arc::new(MemoryRecordStore::new());
    seed_tax_ids(&store, &[valid_tax_id(1000)]);
    let importer = create_test_importer(store.clone(), settings(200, 300));

    let summary = importer
        .import_rows(
            patient_table(200, 1000),
            ConflictPolicy::Create,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .unwrap();

    assert_eq!(summary.counters.created, 199);
    assert_eq!(summary.counters.duplicate_skipped, 1);
    assert_eq!(summary.counters.technical_errors, 0);

    let duplicates: Vec<_> = summary
        .report_rows
        .iter()
        .filter(|r| r.status == RowStatus::DuplicateSkipped)
        .collect();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].line, 1);
    assert!(duplicates[0]
        .reason
        .as_deref()
        .unwrap()
        .starts_with("CPF já cadastrado"));
}

#[tokio::test]
async fn test_report_from_run_contains_header_and_statuses() {
    let store = Arc::new(MemoryRecordStore::new());
    seed_tax_ids(&store, &[valid_tax_id(1)]);
    let importer = create_test_importer(store, settings(200, 300));

    let summary = importer
        .import_rows(
            patient_table(2, 1),
            ConflictPolicy::Create,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .unwrap();

    let text = ReportBuilder::from_summary(&summary).to_csv().unwrap();

    assert!(text.starts_with("linha,nome,cpf,status,motivo\n"));
    assert!(text.lines().any(|l| l.starts_with("1,")));
    assert!(text.contains("DUPLICATE_SKIPPED"));
    assert!(text.contains("CREATED"));
}

// ==========================================
// 行级分类
// ==========================================

#[tokio::test]
async fn test_rows_without_signal_are_ignored_and_counted() {
    let store = Arc::new(MemoryRecordStore::new());
    let importer = create_test_importer(store.clone(), settings(200, 300));
    let headers = ["Nome", "CPF", "Telefone", "Cidade"];
    let rows = vec![
        vec!["Ana".to_string(), "".to_string(), "".to_string(), "".to_string()],
        vec!["".to_string(), "123".to_string(), "9999".to_string(), "Recife".to_string()],
        vec!["".to_string(), "".to_string(), "(81) 98888-7777".to_string(), "".to_string()],
        vec!["".to_string(), valid_tax_id(5), "".to_string(), "".to_string()],
    ];

    let summary = importer
        .import_rows(
            raw_table(&headers, &rows),
            ConflictPolicy::Create,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .unwrap();

    assert_eq!(summary.counters.created, 3);
    assert_eq!(summary.counters.ignored, 1);
    assert_eq!(summary.report_rows[1].status, RowStatus::Ignored);
    assert_eq!(summary.report_rows[1].name, "Linha 2");
    assert!(summary.is_reconciled());

    // 缺失 CPF 的新档案写入互不相同的占位值
    let placeholders: Vec<String> = (1..=3)
        .filter_map(|i| store.get(&format!("novo-{}", i)))
        .filter(|p| p.documents.tax_id_is_placeholder)
        .filter_map(|p| p.documents.tax_id.clone())
        .collect();
    assert_eq!(placeholders.len(), 2);
    assert_ne!(placeholders[0], placeholders[1]);
}

#[tokio::test]
async fn test_same_tax_id_twice_in_file_keeps_first() {
    let store = Arc::new(MemoryRecordStore::new());
    let importer = create_test_importer(store.clone(), settings(200, 300));
    let mut second = patient_row(7);
    second[0] = "Outro Nome".to_string();
    let rows = vec![patient_row(7), patient_row(8), second];

    let summary = importer
        .import_rows(
            raw_table(&PATIENT_HEADERS, &rows),
            ConflictPolicy::Create,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .unwrap();

    assert_eq!(summary.counters.created, 2);
    assert_eq!(summary.counters.duplicate_skipped, 1);
    assert_eq!(summary.report_rows[2].status, RowStatus::DuplicateSkipped);
    assert_eq!(
        store.find_by_tax_id(&valid_tax_id(7)).unwrap().profile.full_name.as_deref(),
        Some("Paciente 7")
    );
}

#[tokio::test]
async fn test_update_failure_is_isolated_to_its_row() {
    logging::init_test();

    let store = Arc::new(MemoryRecordStore::new());
    let ids = seed_tax_ids(&store, &[valid_tax_id(0), valid_tax_id(1), valid_tax_id(2)]);
    store.fail_update_for(&ids[1]);
    let importer = create_test_importer(store.clone(), settings(200, 300));

    let summary = importer
        .import_rows(
            patient_table(3, 0),
            ConflictPolicy::UpdateById,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .unwrap();

    assert_eq!(summary.counters.updated, 2);
    assert_eq!(summary.counters.technical_errors, 1);
    assert_eq!(summary.report_rows[0].status, RowStatus::Updated);
    assert_eq!(summary.report_rows[1].status, RowStatus::TechnicalError);
    assert_eq!(summary.report_rows[2].status, RowStatus::Updated);
    assert!(summary
        .errors
        .iter()
        .any(|e| e.row == RowRef::Line(2) && !e.errors.is_empty()));
    assert!(summary.is_reconciled());
}

#[tokio::test]
async fn test_merge_policy_combines_fields() {
    let store = Arc::new(MemoryRecordStore::new());
    let tax_id = valid_tax_id(9);
    let ids = store.seed(&[(tax_id.as_str(), Some("PR-9"))]);
    let importer = create_test_importer(store.clone(), settings(200, 300));
    let rows = vec![vec![
        "Paciente Nove".to_string(),
        tax_id.clone(),
        "novo@exemplo.com".to_string(),
    ]];

    let summary = importer
        .import_rows(
            raw_table(&["Nome", "CPF", "E-mail"], &rows),
            ConflictPolicy::Merge,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .unwrap();

    assert_eq!(summary.counters.merged, 1);
    let stored = store.get(&ids[0]).unwrap();
    assert_eq!(stored.profile.email.as_deref(), Some("novo@exemplo.com"));
    assert_eq!(stored.profile.full_name.as_deref(), Some("Paciente Nove"));
    assert_eq!(stored.record.record_number.as_deref(), Some("PR-9"));
}

#[tokio::test]
async fn test_update_by_reference_matches_record_number() {
    let store = Arc::new(MemoryRecordStore::new());
    let ids = store.seed(&[(valid_tax_id(50).as_str(), Some("PR-3"))]);
    let importer = create_test_importer(store.clone(), settings(200, 300));
    let rows = vec![
        vec!["Paciente Três".to_string(), "PR-3".to_string()],
        vec!["Paciente Quatro".to_string(), "PR-4".to_string()],
    ];

    let summary = importer
        .import_rows(
            raw_table(&["Nome", "Prontuário"], &rows),
            ConflictPolicy::UpdateByReference,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .unwrap();

    assert_eq!(summary.counters.updated, 1);
    assert_eq!(summary.counters.created, 1);
    let stored = store.get(&ids[0]).unwrap();
    assert_eq!(stored.profile.full_name.as_deref(), Some("Paciente Três"));
    // 替换模式下识别键保留
    assert_eq!(stored.tax_id(), Some(valid_tax_id(50).as_str()));
}

// ==========================================
// 批量写入失败
// ==========================================

#[tokio::test]
async fn test_failed_batch_marks_its_rows_as_technical_errors() {
    logging::init_test();

    let store = Arc::new(MemoryRecordStore::new());
    store.fail_batch_call(2);
    let importer = create_test_importer(store.clone(), settings(5, 300));

    let summary = importer
        .import_rows(
            patient_table(12, 1),
            ConflictPolicy::Create,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .unwrap();

    assert_eq!(summary.counters.created, 7);
    assert_eq!(summary.counters.technical_errors, 5);
    assert!(summary.is_reconciled());
    for row in &summary.report_rows[5..10] {
        assert_eq!(row.status, RowStatus::TechnicalError);
        assert!(row.reason.as_deref().unwrap().contains("lote 2"));
    }
    assert!(summary
        .errors
        .iter()
        .any(|e| e.row == RowRef::Batch("lote 2".to_string())));
    assert_eq!(store.len(), 7);
    assert_eq!(summary.with_pending, 7);
}

// ==========================================
// 取消与截断
// ==========================================

#[tokio::test]
async fn test_cancellation_returns_partial_report_and_keeps_flushed_batches() {
    logging::init_test();

    let store = Arc::new(MemoryRecordStore::new());
    let importer = create_test_importer(store.clone(), settings(10, 300));
    let flag = CancelFlag::new();
    let trigger = flag.clone();
    let progress = move |event: ProgressEvent| {
        if event.current == 25 {
            trigger.cancel();
        }
    };

    let summary = importer
        .import_rows(patient_table(100, 1), ConflictPolicy::Create, &progress, &flag)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.total_rows_in_file, 100);
    // 每 10 行检查一次取消
    assert_eq!(summary.processed_rows, 30);
    assert_eq!(summary.counters.total(), 30);
    assert_eq!(summary.report_rows.len(), 30);
    assert_eq!(store.len(), 30);
}

#[tokio::test]
async fn test_cancellation_flushes_pending_batch() {
    let store = Arc::new(MemoryRecordStore::new());
    let importer = create_test_importer(store.clone(), settings(200, 300));
    let flag = CancelFlag::new();
    let trigger = flag.clone();
    let progress = move |event: ProgressEvent| {
        if event.current == 5 {
            trigger.cancel();
        }
    };

    let summary = importer
        .import_rows(patient_table(50, 1), ConflictPolicy::Create, &progress, &flag)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.counters.created, 10);
    assert_eq!(store.len(), 10);
    assert_eq!(store.batch_calls(), 1);
}

#[tokio::test]
async fn test_cancel_before_start_processes_nothing() {
    let store = Arc::new(MemoryRecordStore::new());
    let importer = create_test_importer(store.clone(), settings(200, 300));

    let summary = importer
        .import_rows(
            patient_table(5, 1),
            ConflictPolicy::Create,
            &CollectingProgress::new(),
            &|| true,
        )
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.processed_rows, 0);
    assert_eq!(summary.counters.total(), 0);
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn test_rows_beyond_ceiling_are_truncated() {
    let store = Arc::new(MemoryRecordStore::new());
    let mut config = settings(200, 300);
    config.max_rows = 50;
    let importer = create_test_importer(store.clone(), config);

    let summary = importer
        .import_rows(
            patient_table(60, 1),
            ConflictPolicy::Create,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await
        .unwrap();

    assert!(summary.truncated);
    assert_eq!(summary.total_rows_in_file, 60);
    assert_eq!(summary.processed_rows, 50);
    assert_eq!(summary.counters.created, 50);
    assert_eq!(summary.report_rows.last().unwrap().line, 50);
}

// ==========================================
// 进度事件
// ==========================================

#[tokio::test]
async fn test_progress_events_are_strictly_increasing() {
    let store = Arc::new(MemoryRecordStore::new());
    let importer = create_test_importer(store, settings(4, 3));
    let progress = CollectingProgress::new();

    importer
        .import_rows(
            patient_table(10, 1),
            ConflictPolicy::Create,
            &progress,
            &NeverCancel,
        )
        .await
        .unwrap();

    let events = progress.events();
    assert_eq!(events[0].phase, ImportPhase::Reading);
    assert_eq!(events[0].total, 10);
    assert_eq!(events.len(), 11);
    for pair in events.windows(2) {
        assert!(pair[1].current > pair[0].current);
    }

    // 第 4、8 行触发批量刷新
    let saving: Vec<usize> = events
        .iter()
        .filter(|e| e.phase == ImportPhase::Saving)
        .map(|e| e.current)
        .collect();
    assert_eq!(saving, vec![4, 8]);

    let live = events[1].live_item.as_ref().unwrap();
    assert_eq!(live.line, 1);
    assert_eq!(live.item_type, LiveItemType::ImportedPending);
}

// ==========================================
// 文件路径
// ==========================================

#[tokio::test]
async fn test_import_csv_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let rows = vec![
        vec![
            "Silva, Ana".to_string(),
            valid_tax_id(1),
            "F".to_string(),
            "01/02/1990".to_string(),
            "81999990000".to_string(),
            "PR-1".to_string(),
        ],
        patient_row(2),
    ];
    let path = write_csv(&dir, "pacientes.csv", &PATIENT_HEADERS, &rows).unwrap();

    let store = Arc::new(MemoryRecordStore::new());
    let importer = create_test_importer(store.clone(), settings(200, 300));

    let summary = importer
        .import_file(&path, ConflictPolicy::Create, &CollectingProgress::new(), &NeverCancel)
        .await
        .unwrap();

    assert_eq!(summary.counters.created, 2);
    assert_eq!(summary.report_rows[0].name, "Silva, Ana");
    let stored = store.find_by_tax_id(&valid_tax_id(1)).unwrap();
    assert_eq!(stored.record.record_number.as_deref(), Some("PR-1"));
}

#[tokio::test]
async fn test_import_file_preflight_errors() {
    let store = Arc::new(MemoryRecordStore::new());
    let importer = create_test_importer(store, settings(200, 300));
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("nao_existe.csv");
    let result = importer
        .import_file(&missing, ConflictPolicy::Create, &CollectingProgress::new(), &NeverCancel)
        .await;
    assert!(result.is_err());

    let unsupported = dir.path().join("pacientes.txt");
    std::fs::write(&unsupported, "nome\nAna\n").unwrap();
    let result = importer
        .import_file(
            &unsupported,
            ConflictPolicy::Create,
            &CollectingProgress::new(),
            &NeverCancel,
        )
        .await;
    assert!(result.is_err());
}
