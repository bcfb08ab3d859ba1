//! Tests for the safe code editor: backups, transactions, rollback

use codeforge_editor::{Edit, SafeCodeEditor};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    editor: SafeCodeEditor,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/a.js"), "x=1\n").unwrap();
    fs::write(dir.path().join("src/b.js"), "y=2\n").unwrap();
    let editor = SafeCodeEditor::new(dir.path(), dir.path().join(".backups")).unwrap();
    Fixture { dir, editor }
}

// ===========================================================================
// Proposal and validation
// ===========================================================================

#[tokio::test]
async fn create_edit_does_not_touch_disk() {
    let f = fixture();
    let result = f
        .editor
        .create_edit("src/a.js", "x=42\n", Some("bump"))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(fs::read_to_string(f.dir.path().join("src/a.js")).unwrap(), "x=1\n");
    assert_eq!(f.editor.pending_edits().await.len(), 1);
}

#[tokio::test]
async fn create_edit_flags_invalid_content() {
    let f = fixture();
    let result = f
        .editor
        .create_edit("src/a.js", "function f( {\n", None)
        .await
        .unwrap();
    assert!(!result.success);
    assert!(!result.validation_errors.is_empty());
}

#[tokio::test]
async fn create_edit_rejects_paths_outside_root() {
    let f = fixture();
    assert!(f
        .editor
        .create_edit("../outside.js", "x\n", None)
        .await
        .is_err());
}

#[tokio::test]
async fn cancel_edit_discards_pending() {
    let f = fixture();
    let result = f.editor.create_edit("src/a.js", "x=3\n", None).await.unwrap();
    assert!(f.editor.cancel_edit(&result.edit_id).await);
    assert!(f.editor.pending_edits().await.is_empty());
    assert!(!f.editor.cancel_edit(&result.edit_id).await);
}

// ===========================================================================
// Apply and backup integrity
// ===========================================================================

#[tokio::test]
async fn apply_writes_content_and_backup() {
    let f = fixture();
    let proposal = f
        .editor
        .create_edit("src/a.js", "// Copyright\nx=1\n", None)
        .await
        .unwrap();
    let result = f.editor.apply_edit(&proposal.edit_id).await.unwrap();
    assert!(result.success, "{:?}", result);

    assert_eq!(
        fs::read_to_string(f.dir.path().join("src/a.js")).unwrap(),
        "// Copyright\nx=1\n"
    );

    let applied = f.editor.applied_edits().await;
    assert_eq!(applied.len(), 1);
    let edit: &Edit = &applied[0];
    assert!(edit.applied);

    // backup holds exactly the original bytes
    let backup = edit.backup_path.as_ref().unwrap();
    assert_eq!(fs::read_to_string(backup).unwrap(), "x=1\n");
    assert_eq!(fs::read_to_string(backup).unwrap(), edit.original_content);
}

#[tokio::test]
async fn rollback_restores_original() {
    let f = fixture();
    let proposal = f.editor.create_edit("src/a.js", "x=9\n", None).await.unwrap();
    f.editor.apply_edit(&proposal.edit_id).await.unwrap();
    assert_eq!(fs::read_to_string(f.dir.path().join("src/a.js")).unwrap(), "x=9\n");

    f.editor.rollback_edit(&proposal.edit_id).await.unwrap();
    assert_eq!(fs::read_to_string(f.dir.path().join("src/a.js")).unwrap(), "x=1\n");
    assert!(f.editor.applied_edits().await.is_empty());
}

#[tokio::test]
async fn apply_creates_new_files() {
    let f = fixture();
    let proposal = f
        .editor
        .create_edit("src/new.js", "fresh()\n", None)
        .await
        .unwrap();
    let result = f.editor.apply_edit(&proposal.edit_id).await.unwrap();
    assert!(result.success);
    assert_eq!(
        fs::read_to_string(f.dir.path().join("src/new.js")).unwrap(),
        "fresh()\n"
    );
    // original content for a new file is empty, and so is its backup
    let applied = f.editor.applied_edits().await;
    let backup = applied[0].backup_path.as_ref().unwrap();
    assert_eq!(fs::read_to_string(backup).unwrap(), "");
}

// ===========================================================================
// Transactions
// ===========================================================================

#[tokio::test]
async fn transaction_applies_all_or_nothing() {
    let f = fixture();
    let a = f.editor.create_edit("src/a.js", "x=10\n", None).await.unwrap();
    let b = f.editor.create_edit("src/b.js", "y=20\n", None).await.unwrap();

    let results = f
        .editor
        .apply_edits(&[a.edit_id.clone(), b.edit_id.clone()])
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.success));
    assert_eq!(fs::read_to_string(f.dir.path().join("src/a.js")).unwrap(), "x=10\n");
    assert_eq!(fs::read_to_string(f.dir.path().join("src/b.js")).unwrap(), "y=20\n");
}

#[tokio::test]
async fn transaction_rolls_back_on_validation_failure() {
    let f = fixture();
    // a.js sorts before b.js, so a is applied first and must be rolled back
    let a = f.editor.create_edit("src/a.js", "x=10\n", None).await.unwrap();
    let b = f
        .editor
        .create_edit("src/b.js", "function broken( {\n", None)
        .await
        .unwrap();
    assert!(!b.success);

    let results = f
        .editor
        .apply_edits(&[a.edit_id.clone(), b.edit_id.clone()])
        .await
        .unwrap();

    // disk equals the pre-call state for every file
    assert_eq!(fs::read_to_string(f.dir.path().join("src/a.js")).unwrap(), "x=1\n");
    assert_eq!(fs::read_to_string(f.dir.path().join("src/b.js")).unwrap(), "y=2\n");

    // both edits report failure with validation errors populated
    assert_eq!(results.len(), 2);
    for result in &results {
        assert!(!result.success);
        assert!(
            !result.validation_errors.is_empty(),
            "expected validation errors on {:?}",
            result
        );
    }
    assert!(f.editor.applied_edits().await.is_empty());
}

#[tokio::test]
async fn transaction_unknown_id_is_an_error() {
    let f = fixture();
    let a = f.editor.create_edit("src/a.js", "x=10\n", None).await.unwrap();
    assert!(f
        .editor
        .apply_edits(&[a.edit_id.clone(), "missing".to_string()])
        .await
        .is_err());
    // nothing was applied
    assert_eq!(fs::read_to_string(f.dir.path().join("src/a.js")).unwrap(), "x=1\n");
}

// ===========================================================================
// Backups housekeeping and serialization
// ===========================================================================

#[tokio::test]
async fn cleanup_removes_only_old_backups() {
    let f = fixture();
    let proposal = f.editor.create_edit("src/a.js", "x=5\n", None).await.unwrap();
    f.editor.apply_edit(&proposal.edit_id).await.unwrap();

    // everything is fresh: nothing to remove
    let removed = f
        .editor
        .cleanup_backups(Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(removed, 0);

    // zero max-age: the backup qualifies
    tokio::time::sleep(Duration::from_millis(20)).await;
    let removed = f.editor.cleanup_backups(Duration::ZERO).await.unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn edit_round_trips_through_serde() {
    let f = fixture();
    let proposal = f.editor.create_edit("src/a.js", "x=7\n", Some("tweak")).await.unwrap();
    f.editor.apply_edit(&proposal.edit_id).await.unwrap();
    let edit = f.editor.applied_edits().await.remove(0);

    let json = serde_json::to_string(&edit).unwrap();
    let back: Edit = serde_json::from_str(&json).unwrap();
    assert_eq!(edit, back);
}

#[tokio::test]
async fn cancel_all_pending_clears_proposals() {
    let f = fixture();
    f.editor.create_edit("src/a.js", "x=2\n", None).await.unwrap();
    f.editor.create_edit("src/b.js", "y=3\n", None).await.unwrap();
    assert_eq!(f.editor.cancel_all_pending().await, 2);
    assert!(f.editor.pending_edits().await.is_empty());
}
