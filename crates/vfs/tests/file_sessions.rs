//! Integration tests for recipe file sessions.
//!
//! Operations tested:
//! - open: loads the payload, rejects a second session
//! - read: offsets inside and past the buffer
//! - write: append and truncate-at-offset semantics, write policy
//! - flush: saves only dirty buffers, keeps edits on failure
//! - release: ends the session, optionally saving first

use std::sync::Arc;

use dssfs_api::{MemoryRecipeSource, ProjectSnapshot, RecipeSnapshot, SavedPayload};
use dssfs_vfs::{FileState, HandleId, INodeId, Node, RecipeFs, VfsError, VfsOptions};

/// Helper to create a filesystem with one python recipe holding "abcdef".
fn create_test_env(allow_writes: bool) -> (Arc<MemoryRecipeSource>, RecipeFs, INodeId) {
    let source: Arc<MemoryRecipeSource> = Arc::new(MemoryRecipeSource::new());
    source.add_project(ProjectSnapshot::new("PROJ", "Project"));
    source.add_recipe(RecipeSnapshot::new("PROJ", "recipe1.py", "python"), "abcdef");

    let options: VfsOptions = VfsOptions::default().with_allow_writes(allow_writes);
    let fs: RecipeFs = RecipeFs::new(source.clone(), options);
    let ino: INodeId = fs.resolve_path("/Project/recipe1.py").unwrap().inode();
    (source, fs, ino)
}

fn file_state(fs: &RecipeFs, ino: INodeId) -> FileState {
    match fs.node(ino).unwrap() {
        Node::File(file) => file.state(),
        other => panic!("expected a file, got {:?}", other),
    }
}

#[test]
fn test_open_read_release() {
    let (_source, fs, ino) = create_test_env(false);
    assert_eq!(file_state(&fs, ino), FileState::Closed);

    let fh: HandleId = fs.open(ino).unwrap();
    assert_eq!(file_state(&fs, ino), FileState::OpenClean);
    assert_eq!(fs.read(ino, fh, 0, 4096).unwrap(), b"abcdef");
    assert_eq!(fs.read(ino, fh, 4, 4096).unwrap(), b"ef");
    assert!(fs.read(ino, fh, 6, 4096).unwrap().is_empty());

    fs.release(ino, fh, true).unwrap();
    assert_eq!(file_state(&fs, ino), FileState::Closed);
}

#[test]
fn test_second_open_is_busy() {
    let (_source, fs, ino) = create_test_env(false);
    let fh: HandleId = fs.open(ino).unwrap();

    let err: VfsError = fs.open(ino).unwrap_err();
    assert_eq!(err.errno(), libc::EBUSY);

    fs.release(ino, fh, false).unwrap();
    let again: HandleId = fs.open(ino).unwrap();
    assert_ne!(again, fh);
}

#[test]
fn test_write_truncates_after_offset() {
    let (_source, fs, ino) = create_test_env(true);
    let fh: HandleId = fs.open(ino).unwrap();

    assert_eq!(fs.write(ino, fh, 2, b"XY").unwrap(), 2);
    assert_eq!(fs.read(ino, fh, 0, 4096).unwrap(), b"abXY");
    assert_eq!(file_state(&fs, ino), FileState::OpenDirty);
    assert_eq!(fs.attributes(ino).unwrap().size, 4);
}

#[test]
fn test_write_past_end_appends() {
    let (_source, fs, ino) = create_test_env(true);
    let fh: HandleId = fs.open(ino).unwrap();

    fs.write(ino, fh, 6, b"gh").unwrap();
    fs.write(ino, fh, 42, b"!").unwrap();
    assert_eq!(fs.read(ino, fh, 0, 4096).unwrap(), b"abcdefgh!");
}

#[test]
fn test_edit_round_trip() {
    let (source, fs, ino) = create_test_env(true);
    let fh: HandleId = fs.open(ino).unwrap();
    fs.write(ino, fh, 0, b"print('edited')\n").unwrap();
    fs.flush(ino, fh).unwrap();
    fs.release(ino, fh, true).unwrap();

    let saves: Vec<SavedPayload> = source.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].project_key, "PROJ");
    assert_eq!(saves[0].recipe_name, "recipe1.py");
    assert_eq!(saves[0].content, "print('edited')\n");

    let fh: HandleId = fs.open(ino).unwrap();
    assert_eq!(fs.read(ino, fh, 0, 4096).unwrap(), b"print('edited')\n");
}

#[test]
fn test_clean_flush_does_not_save() {
    let (source, fs, ino) = create_test_env(true);
    let fh: HandleId = fs.open(ino).unwrap();
    fs.flush(ino, fh).unwrap();
    fs.release(ino, fh, true).unwrap();
    assert!(source.saves().is_empty());
}

#[test]
fn test_release_with_flush_saves() {
    let (source, fs, ino) = create_test_env(true);
    let fh: HandleId = fs.open(ino).unwrap();
    fs.write(ino, fh, 0, b"x").unwrap();
    fs.release(ino, fh, true).unwrap();
    assert_eq!(source.payload("PROJ", "recipe1.py").unwrap(), "x");
}

#[test]
fn test_release_without_flush_discards() {
    let (source, fs, ino) = create_test_env(true);
    let fh: HandleId = fs.open(ino).unwrap();
    fs.write(ino, fh, 0, b"x").unwrap();
    fs.release(ino, fh, false).unwrap();

    assert!(source.saves().is_empty());
    assert_eq!(source.payload("PROJ", "recipe1.py").unwrap(), "abcdef");
}

#[test]
fn test_failed_flush_keeps_edits() {
    let (source, fs, ino) = create_test_env(true);
    let fh: HandleId = fs.open(ino).unwrap();
    fs.write(ino, fh, 3, b"XYZ").unwrap();

    source.fail_saves(true);
    let err: VfsError = fs.flush(ino, fh).unwrap_err();
    assert_eq!(err.errno(), libc::EIO);
    assert_eq!(file_state(&fs, ino), FileState::OpenDirty);
    assert!(fs.release(ino, fh, true).is_err());
    assert_eq!(file_state(&fs, ino), FileState::OpenDirty);

    source.fail_saves(false);
    fs.flush(ino, fh).unwrap();
    assert_eq!(file_state(&fs, ino), FileState::OpenClean);
    assert_eq!(source.payload("PROJ", "recipe1.py").unwrap(), "abcXYZ");
}

#[test]
fn test_writes_disabled_by_default() {
    let (source, fs, ino) = create_test_env(false);
    let fh: HandleId = fs.open(ino).unwrap();

    let err: VfsError = fs.write(ino, fh, 0, b"nope").unwrap_err();
    assert_eq!(err.errno(), libc::EROFS);
    assert_eq!(fs.read(ino, fh, 0, 4096).unwrap(), b"abcdef");
    fs.release(ino, fh, true).unwrap();
    assert!(source.saves().is_empty());
}

#[test]
fn test_invalid_utf8_rejected() {
    let (source, fs, ino) = create_test_env(true);
    let fh: HandleId = fs.open(ino).unwrap();
    fs.write(ino, fh, 0, &[0xc3, 0x28]).unwrap();

    let err: VfsError = fs.flush(ino, fh).unwrap_err();
    assert!(matches!(err, VfsError::InvalidContent(_)));
    assert_eq!(err.errno(), libc::EIO);
    assert!(source.saves().is_empty());
}

#[test]
fn test_stale_handles_rejected() {
    let (_source, fs, ino) = create_test_env(true);
    let fh: HandleId = fs.open(ino).unwrap();
    fs.release(ino, fh, false).unwrap();

    for err in [
        fs.read(ino, fh, 0, 10).unwrap_err(),
        fs.write(ino, fh, 0, b"x").unwrap_err(),
        fs.flush(ino, fh).unwrap_err(),
        fs.release(ino, fh, false).unwrap_err(),
    ] {
        assert_eq!(err.errno(), libc::ENOTSUP);
    }
}

#[test]
fn test_open_failure_reports_remote_error() {
    let (source, fs, ino) = create_test_env(false);
    source.fail_fetches(true);

    let err: VfsError = fs.open(ino).unwrap_err();
    assert!(matches!(err, VfsError::RemoteUnavailable(_)));
    assert_eq!(file_state(&fs, ino), FileState::Closed);
}

#[test]
fn test_closed_file_size_matches_payload() {
    let (_source, fs, ino) = create_test_env(false);
    let attr = fs.attributes(ino).unwrap();
    assert_eq!(attr.size, 6);
    assert_eq!(attr.perm, 0o644);
}
