//! Determinism check against hand-built trees

mod common;

use sign_release::{check_double_signing, CheckError, DeepHasher, DeepPath};
use tempfile::TempDir;

use common::{tar_gz_bytes, write_file, zip_bytes};

#[test]
fn test_divergent_nested_entries_detected() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write_file(source.path(), "a.zip", &zip_bytes(&[("tool.exe", b"MZ")]));
    write_file(source.path(), "b.tar.gz", &tar_gz_bytes(&[("tool.exe", b"MZ")]));
    write_file(destination.path(), "a.zip", &zip_bytes(&[("tool.exe", b"MZ signed once")]));
    write_file(destination.path(), "b.tar.gz", &tar_gz_bytes(&[("tool.exe", b"MZ signed twice")]));

    match check_double_signing(source.path(), destination.path()) {
        Err(CheckError::DoubleSigning(violations)) => {
            assert_eq!(violations.len(), 1);
            let mut pair = [violations[0].first.to_string(), violations[0].second.to_string()];
            pair.sort();
            assert_eq!(pair, ["a.zip!tool.exe", "b.tar.gz!tool.exe"]);
        }
        other => panic!("expected a determinism error, got {:?}", other),
    }
}

#[test]
fn test_consistent_nested_entries_pass() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write_file(source.path(), "a.zip", &zip_bytes(&[("tool.exe", b"MZ")]));
    write_file(source.path(), "b.zip", &zip_bytes(&[("tool.exe", b"MZ")]));
    let signed = zip_bytes(&[("tool.exe", b"MZ signed")]);
    write_file(destination.path(), "a.zip", &signed);
    write_file(destination.path(), "b.zip", &signed);

    check_double_signing(source.path(), destination.path()).unwrap();
}

#[test]
fn test_hasher_addresses_tar_entries() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "npm/pkg.tgz",
        &tar_gz_bytes(&[("package/bin/tool", b"elf"), ("package/package.json", b"{}")]),
    );

    let mut hasher = DeepHasher::new();
    hasher.hash_directory(dir.path()).unwrap();
    assert_eq!(hasher.len(), 3);
    assert!(hasher
        .get(&DeepPath::parse("npm/pkg.tgz!package/bin/tool").unwrap())
        .is_some());
}
