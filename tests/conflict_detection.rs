//! End-to-end conflict detection: the same device/cluster pair written with
//! differing bytes across two extents must fail the whole run, while an
//! identical rewrite of the same cluster is accepted.

mod common;

use std::path::PathBuf;
use std::process::Command;

use common::{build_archive, cluster_of};

fn bin() -> PathBuf {
    if let Ok(p) = std::env::var("CARGO_BIN_EXE_vma-extract") {
        return PathBuf::from(p);
    }
    let mut p = std::env::current_exe().unwrap();
    p.pop();
    if p.ends_with("deps") {
        p.pop();
    }
    p.push("vma-extract");
    p
}

fn write_archive(dir: &std::path::Path, bytes: &[u8]) -> PathBuf {
    let path = dir.join("backup.vma");
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn differing_rewrite_of_same_cluster_fails() {
    let buf_a = cluster_of(0x11);
    let buf_b = cluster_of(0x22);
    let archive = build_archive(
        &[("scsi0", buf_a.len() as u64)],
        &[],
        &[vec![(1, 0, Some(buf_a))], vec![(1, 0, Some(buf_b))]],
    );

    let in_dir = tempfile::tempdir().unwrap();
    let archive_path = write_archive(in_dir.path(), &archive);
    let out_dir = tempfile::tempdir().unwrap();

    let status = Command::new(bin())
        .arg(&archive_path)
        .arg(out_dir.path())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(3));
}

#[test]
fn identical_rewrite_of_same_cluster_succeeds() {
    let buf = cluster_of(0x33);
    let archive = build_archive(
        &[("scsi0", buf.len() as u64)],
        &[],
        &[vec![(1, 0, Some(buf.clone()))], vec![(1, 0, Some(buf.clone()))]],
    );

    let in_dir = tempfile::tempdir().unwrap();
    let archive_path = write_archive(in_dir.path(), &archive);
    let out_dir = tempfile::tempdir().unwrap();

    let status = Command::new(bin())
        .arg(&archive_path)
        .arg(out_dir.path())
        .status()
        .unwrap();
    assert!(status.success());

    let disk = std::fs::read(out_dir.path().join("scsi0.raw")).unwrap();
    assert_eq!(disk, buf);
}
