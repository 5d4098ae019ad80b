//! End-to-end pipeline tests.
//!
//! Wires the in-memory stores and the local-directory transfer backend
//! through the full export → transfer → import → report chain, exercising
//! the same orchestration code paths the PostgreSQL/SFTP wiring uses.

use std::path::PathBuf;
use std::sync::Arc;

use rowferry::report::ReportEngine;
use rowferry::{
    Dataset, FerryError, LocalDirTransfer, MemoryStore, MigrationJob, Migrator, ReportConfig,
};
use tokio::sync::watch;

struct Fixture {
    source: Arc<MemoryStore>,
    dest: Arc<MemoryStore>,
    transfer: Arc<LocalDirTransfer>,
    migrator: Arc<Migrator>,
    work_dir: tempfile::TempDir,
    _remote_dir: tempfile::TempDir,
}

impl Fixture {
    fn local(&self, name: &str) -> PathBuf {
        self.work_dir.path().join(name)
    }

    fn engine(&self) -> ReportEngine {
        ReportEngine::new(
            self.dest.clone(),
            self.migrator.clone(),
            self.transfer.clone(),
            "/outbound",
            "name",
        )
    }
}

fn no_cancel() -> watch::Receiver<bool> {
    // The receiver keeps reporting the last value after the sender drops.
    watch::channel(false).1
}

fn users_columns() -> Vec<String> {
    vec![
        "id".into(),
        "name".into(),
        "created_at".into(),
        "car_id".into(),
    ]
}

fn user(id: i64, name: &str, created_at: &str, car_id: Option<i64>) -> Vec<Option<String>> {
    vec![
        Some(id.to_string()),
        Some(name.to_string()),
        Some(created_at.to_string()),
        car_id.map(|c| c.to_string()),
    ]
}

async fn fixture(source_rows: Vec<Vec<Option<String>>>) -> Fixture {
    let work_dir = tempfile::tempdir().unwrap();
    let remote_dir = tempfile::tempdir().unwrap();

    let mut users = Dataset::new(users_columns());
    for row in source_rows {
        users.push_row(row).unwrap();
    }

    let source = Arc::new(MemoryStore::new(ReportConfig::default()));
    source.insert_table("users", users).await;

    let dest = Arc::new(MemoryStore::new(ReportConfig::default()));
    dest.insert_table("users", Dataset::new(users_columns()))
        .await;
    dest.insert_table("cars", Dataset::new(vec!["id".into()]))
        .await;

    let transfer = Arc::new(LocalDirTransfer::new(remote_dir.path()));
    let migrator = Arc::new(Migrator::new(
        source.clone(),
        dest.clone(),
        transfer.clone(),
        "/outbound",
        2,
    ));

    Fixture {
        source,
        dest,
        transfer,
        migrator,
        work_dir,
        _remote_dir: remote_dir,
    }
}

#[tokio::test]
async fn test_export_transfer_import_round_trip() {
    let fx = fixture(vec![
        user(1, "Ada", "2024-01-05T10:00:00Z", Some(1)),
        user(2, "Bo", "2024-01-20T10:00:00Z", None),
        user(3, "Cy", "2024-02-01T10:00:00Z", Some(1)),
    ])
    .await;
    let cancel = no_cancel();

    let export = fx
        .migrator
        .export_and_transfer("users", &fx.local("users.csv"), &cancel)
        .await
        .unwrap();
    assert_eq!(export.rows, 3);
    assert_eq!(export.remote_path, "/outbound/users.csv");

    let import = fx
        .migrator
        .download_and_import("users.csv", &fx.local("import.csv"), "users", &cancel)
        .await
        .unwrap();
    assert_eq!(import.rows, 3);

    let migrated = fx.dest.table("users").await.unwrap();
    assert_eq!(migrated.rows.len(), 3);
    assert_eq!(migrated.rows[0][1], Some("Ada".into()));
    // The NULL car_id came back as an empty string: nullability does not
    // survive the tabular format.
    assert_eq!(migrated.rows[1][3], Some(String::new()));
}

#[tokio::test]
async fn test_run_job_chains_both_halves() {
    let fx = fixture(vec![
        user(1, "Ada", "2024-01-05T10:00:00Z", None),
        user(2, "Ada", "2024-01-06T10:00:00Z", None),
    ])
    .await;

    let job = MigrationJob {
        source_table: "users".into(),
        local_path: fx.local("users.csv"),
        remote_file: "users.csv".into(),
        destination_table: "users".into(),
    };
    let summary = fx.migrator.run_job(&job, &no_cancel()).await.unwrap();

    assert_eq!(summary.export.rows, 2);
    assert_eq!(summary.import.rows, 2);
    assert_eq!(fx.dest.table("users").await.unwrap().rows.len(), 2);
}

#[tokio::test]
async fn test_migrate_then_duplicates() {
    let fx = fixture(vec![
        user(1, "Ada", "2024-01-05T10:00:00Z", None),
        user(2, "Bo", "2024-01-10T10:00:00Z", None),
        user(3, "Ada", "2024-01-15T10:00:00Z", None),
    ])
    .await;

    let job = MigrationJob {
        source_table: "users".into(),
        local_path: fx.local("users.csv"),
        remote_file: "users.csv".into(),
        destination_table: "users".into(),
    };
    let report = fx
        .engine()
        .migrate_then_duplicates(&job, &no_cancel())
        .await
        .unwrap();

    assert_eq!(report.migration.import.rows, 3);
    assert_eq!(report.duplicates, vec!["Ada".to_string()]);
}

#[tokio::test]
async fn test_csv_duplicates_without_import() {
    let fx = fixture(vec![
        user(1, "Ada", "2024-01-05T10:00:00Z", None),
        user(2, "Ada", "2024-01-06T10:00:00Z", None),
        user(3, "Bo", "2024-01-07T10:00:00Z", None),
    ])
    .await;
    let cancel = no_cancel();

    fx.migrator
        .export_and_transfer("users", &fx.local("users.csv"), &cancel)
        .await
        .unwrap();

    let duplicates = fx
        .engine()
        .csv_duplicate_names("users.csv", &fx.local("snapshot.csv"))
        .await
        .unwrap();

    assert_eq!(duplicates, vec!["Ada".to_string()]);
    // No import happened: the destination table is still empty.
    assert!(fx.dest.table("users").await.unwrap().rows.is_empty());
}

#[tokio::test]
async fn test_store_reports_after_migration() {
    let fx = fixture(vec![
        user(1, "Ada", "2024-01-05T10:00:00Z", Some(1)),
        user(2, "Bo", "2024-01-20T10:00:00Z", Some(1)),
        user(3, "Cy", "2024-02-01T10:00:00Z", None),
    ])
    .await;

    // Two cars; car 1 is referenced twice, car 2 never.
    let mut cars = Dataset::new(vec!["id".into()]);
    cars.push_row(vec![Some("1".into())]).unwrap();
    cars.push_row(vec![Some("2".into())]).unwrap();
    fx.dest.insert_table("cars", cars).await;

    let job = MigrationJob {
        source_table: "users".into(),
        local_path: fx.local("users.csv"),
        remote_file: "users.csv".into(),
        destination_table: "users".into(),
    };
    fx.migrator.run_job(&job, &no_cancel()).await.unwrap();

    let engine = fx.engine();
    assert_eq!(engine.latest_cohort_names().await.unwrap(), vec!["Cy".to_string()]);
    assert_eq!(engine.count_matched_entities().await.unwrap(), 2);
    assert_eq!(engine.count_unreferenced_secondaries().await.unwrap(), 1);
}

#[tokio::test]
async fn test_import_rejects_unknown_destination_columns() {
    let fx = fixture(vec![user(1, "Ada", "2024-01-05T10:00:00Z", None)]).await;
    let cancel = no_cancel();

    // Destination schema lost the car_id column.
    fx.dest
        .insert_table(
            "users",
            Dataset::new(vec!["id".into(), "name".into(), "created_at".into()]),
        )
        .await;

    fx.migrator
        .export_and_transfer("users", &fx.local("users.csv"), &cancel)
        .await
        .unwrap();

    let err = fx
        .migrator
        .download_and_import("users.csv", &fx.local("import.csv"), "users", &cancel)
        .await
        .unwrap_err();

    match err {
        FerryError::ColumnMismatch { table, missing } => {
            assert_eq!(table, "users");
            assert_eq!(missing, vec!["car_id".to_string()]);
        }
        other => panic!("expected ColumnMismatch, got {:?}", other),
    }

    // Nothing was loaded.
    assert!(fx.dest.table("users").await.unwrap().rows.is_empty());
}

#[tokio::test]
async fn test_import_of_missing_remote_file_is_not_found() {
    let fx = fixture(vec![]).await;
    let err = fx
        .migrator
        .download_and_import("ghost.csv", &fx.local("import.csv"), "users", &no_cancel())
        .await
        .unwrap_err();
    assert!(matches!(err, FerryError::NotFound(_)));
}

#[tokio::test]
async fn test_upload_twice_leaves_second_contents() {
    let fx = fixture(vec![user(1, "Ada", "2024-01-05T10:00:00Z", None)]).await;
    let cancel = no_cancel();

    fx.migrator
        .export_and_transfer("users", &fx.local("users.csv"), &cancel)
        .await
        .unwrap();

    // Second export with one more row overwrites the same remote path.
    let mut users = Dataset::new(users_columns());
    users
        .push_row(user(1, "Ada", "2024-01-05T10:00:00Z", None))
        .unwrap();
    users
        .push_row(user(2, "Bo", "2024-01-06T10:00:00Z", None))
        .unwrap();
    fx.source.insert_table("users", users).await;

    fx.migrator
        .export_and_transfer("users", &fx.local("users.csv"), &cancel)
        .await
        .unwrap();

    let import = fx
        .migrator
        .download_and_import("users.csv", &fx.local("import.csv"), "users", &cancel)
        .await
        .unwrap();
    assert_eq!(import.rows, 2);
}

#[tokio::test]
async fn test_cancellation_aborts_export() {
    let fx = fixture(vec![
        user(1, "Ada", "2024-01-05T10:00:00Z", None),
        user(2, "Bo", "2024-01-06T10:00:00Z", None),
        user(3, "Cy", "2024-01-07T10:00:00Z", None),
        user(4, "Di", "2024-01-08T10:00:00Z", None),
    ])
    .await;

    let (tx, cancel) = watch::channel(true);
    let err = fx
        .migrator
        .export_and_transfer("users", &fx.local("users.csv"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, FerryError::Cancelled));
    drop(tx);
}

#[tokio::test]
async fn test_empty_table_migrates_as_header_only_file() {
    let fx = fixture(vec![]).await;
    let cancel = no_cancel();

    let export = fx
        .migrator
        .export_and_transfer("users", &fx.local("users.csv"), &cancel)
        .await
        .unwrap();
    assert_eq!(export.rows, 0);

    let import = fx
        .migrator
        .download_and_import("users.csv", &fx.local("import.csv"), "users", &cancel)
        .await
        .unwrap();
    assert_eq!(import.rows, 0);

    // And the cohort report on the empty destination fails cleanly.
    let err = fx.engine().latest_cohort_names().await.unwrap_err();
    assert!(matches!(err, FerryError::EmptyDataset));
}
