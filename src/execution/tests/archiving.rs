use crate::execution::test_helpers::*;
use crate::execution::{ArchivingExecutionManager, ExecutionLifecycle, SIDE_EFFECTS_DIR};
use crate::types::Status;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

fn archive_entries(path: &Path) -> HashMap<String, String> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut entries = HashMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        entries.insert(name, content);
    }
    entries
}

#[tokio::test]
async fn failing_cell_still_completes_with_partial_archive() {
    let notebook = notebook_with(&["write side.txt hello", "raise boom", "write late.txt never"]);
    let fixture = create_job_fixture("j1", &notebook, &["html"], None).await;
    let manager = ArchivingExecutionManager::new(
        fixture.context.clone(),
        Arc::new(ScriptedEngine::default()),
        Arc::new(TextExporter),
    );

    let status = manager.process().await.unwrap();
    assert_eq!(status, Status::Completed);

    let job = fixture.db.get_job("j1").await.unwrap().unwrap();
    assert_eq!(job.status, Status::Completed);
    assert_eq!(job.status_message, None);

    let entries = archive_entries(&fixture.staging_dir.join("notebook.tar.gz"));
    assert_eq!(entries["side.txt"], "hello");
    assert!(entries["notebook.html"].contains("ran: write side.txt hello"));
    assert!(entries.contains_key("notebook.ipynb"));
    assert!(!entries.contains_key("late.txt"));

    assert!(!fixture.staging_dir.join(SIDE_EFFECTS_DIR).exists());
}

#[tokio::test]
async fn kernel_runs_in_side_effects_dir() {
    let notebook = notebook_with(&["x = 1"]);
    let fixture = create_job_fixture("j1", &notebook, &["html"], None).await;
    let engine = Arc::new(ScriptedEngine::default());
    let manager =
        ArchivingExecutionManager::new(fixture.context.clone(), engine.clone(), Arc::new(TextExporter))
            .with_widget_state(false);

    assert_eq!(manager.process().await.unwrap(), Status::Completed);

    let requests = engine.requests.lock().unwrap();
    assert_eq!(requests[0].working_dir, fixture.staging_dir.join(SIDE_EFFECTS_DIR));
    assert!(!requests[0].store_widget_state);
}

#[tokio::test]
async fn nested_side_effects_are_flattened() {
    let notebook = notebook_with(&["write out.csv 1,2"]);
    let fixture = create_job_fixture("j1", &notebook, &["html"], None).await;
    std::fs::create_dir_all(fixture.staging_dir.join("extra")).unwrap();
    std::fs::write(fixture.staging_dir.join("extra").join("notes.txt"), "n").unwrap();

    let manager = ArchivingExecutionManager::new(
        fixture.context.clone(),
        Arc::new(ScriptedEngine::default()),
        Arc::new(TextExporter),
    );
    assert_eq!(manager.process().await.unwrap(), Status::Completed);

    let entries = archive_entries(&fixture.staging_dir.join("notebook.tar.gz"));
    assert_eq!(entries["out.csv"], "1,2");
    assert_eq!(entries["notes.txt"], "n");
    assert!(entries.keys().all(|name| !name.contains('/')));
}

#[tokio::test]
async fn archive_is_not_promoted_to_output() {
    let notebook = notebook_with(&["x = 1"]);
    let fixture = create_job_fixture("j1", &notebook, &["html"], None).await;
    let manager = ArchivingExecutionManager::new(
        fixture.context.clone(),
        Arc::new(ScriptedEngine::default()),
        Arc::new(TextExporter),
    );

    assert_eq!(manager.process().await.unwrap(), Status::Completed);

    let job = fixture.db.get_job("j1").await.unwrap().unwrap();
    assert!(job.job_files.is_empty());
    assert!(!fixture.output_dir.exists());
}

#[tokio::test]
async fn engine_error_fails_after_archiving() {
    let notebook = notebook_with(&["x = 1"]);
    let fixture = create_job_fixture("j1", &notebook, &["html"], None).await;
    let manager = ArchivingExecutionManager::new(
        fixture.context.clone(),
        Arc::new(BrokenEngine),
        Arc::new(TextExporter),
    );

    assert_eq!(manager.process().await.unwrap(), Status::Failed);

    let job = fixture.db.get_job("j1").await.unwrap().unwrap();
    assert_eq!(
        job.status_message.as_deref(),
        Some("execution engine error: kernel python3 not installed")
    );
    assert!(fixture.staging_dir.join("notebook.tar.gz").exists());
    assert!(!fixture.staging_dir.join(SIDE_EFFECTS_DIR).exists());
}

#[test]
fn validate_matches_default_manager() {
    let dir = tempfile::tempdir().unwrap();
    let mut bare = notebook_with(&["x = 1"]);
    bare.metadata.clear();
    let path = dir.path().join("bare.ipynb");
    std::fs::write(&path, bare.to_vec_pretty().unwrap()).unwrap();

    assert!(!<ArchivingExecutionManager as crate::execution::ExecutionManager>::validate(&path));
}

#[tokio::test]
async fn archive_name_in_output_formats_is_not_exported() {
    let notebook = notebook_with(&["x = 1"]);
    let fixture = create_job_fixture("j1", &notebook, &["html", "tar.gz"], None).await;
    let manager = ArchivingExecutionManager::new(
        fixture.context.clone(),
        Arc::new(ScriptedEngine::default()),
        Arc::new(TextExporter),
    );

    // Managers are driven from spawned tasks
    let status = tokio::spawn(async move { manager.process().await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, Status::Completed);

    // The archive is the real archive, not a text export named like one
    let entries = archive_entries(&fixture.staging_dir.join("notebook.tar.gz"));
    assert!(entries["notebook.html"].contains("ran: x = 1"));
}
