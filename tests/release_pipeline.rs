//! End-to-end runs over real archive fixtures

mod common;

use std::fs;
use std::sync::atomic::Ordering;

use base64::Engine;
use chrono::{TimeZone, Utc};
use ed25519_dalek::{Signature, SigningKey, Verifier};
use release_signers::Ed25519Detached;
use sign_release::{
    CheckError, DeepPath, DigestManifest, Pipeline, ReleaseError, SignOperation, Signers,
    TransformRegistry, Transformer,
};
use tempfile::TempDir;

use common::{tar_gz_bytes, tar_gz_entries, write_file, zip_bytes, zip_entry, CountingSigner};

fn signing_key() -> SigningKey {
    SigningKey::generate(&mut rand::rngs::OsRng)
}

fn registry(entries: &[(&str, SignOperation)]) -> TransformRegistry {
    let mut registry = TransformRegistry::new();
    for (path, operation) in entries {
        registry.insert(DeepPath::parse(path).unwrap(), *operation);
    }
    registry
}

#[test]
fn test_identical_executables_signed_once() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write_file(source.path(), "a.zip", &zip_bytes(&[("tool.exe", b"MZ\x90\x00")]));
    write_file(source.path(), "b.zip", &zip_bytes(&[("tool.exe", b"MZ\x90\x00")]));

    let (signer, calls) = CountingSigner::new();
    let signers = Signers::new()
        .with(SignOperation::ExecutableSign, Box::new(signer))
        .with(
            SignOperation::DetachedSignature,
            Box::new(Ed25519Detached::new(signing_key())),
        );
    let registry = registry(&[
        ("a.zip!tool.exe", SignOperation::ExecutableSign),
        ("b.zip!tool.exe", SignOperation::ExecutableSign),
    ]);

    let summary = Pipeline::new(Transformer::new(registry, signers), "SHA256SUMS")
        .run(source.path(), destination.path())
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.cache.hits, 1);

    let a = zip_entry(&fs::read(destination.path().join("a.zip")).unwrap(), "tool.exe");
    let b = zip_entry(&fs::read(destination.path().join("b.zip")).unwrap(), "tool.exe");
    assert_eq!(a, b);
    assert_eq!(a, b"MZ\x90\x00\n#signature 1");
}

#[test]
fn test_detached_signature_next_to_nested_file() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    let binary = b"\x7fELF\x02\x01\x01 quick binary".to_vec();
    write_file(
        source.path(),
        "manual/linux.tar.gz",
        &tar_gz_bytes(&[
            ("app/README", b"read me"),
            ("app/bin/app", binary.as_slice()),
        ]),
    );

    let key = signing_key();
    let verifying_key = key.verifying_key();
    let signers = Signers::new().with(
        SignOperation::DetachedSignature,
        Box::new(Ed25519Detached::new(key)),
    );
    let registry = registry(&[(
        "manual/linux.tar.gz!app/bin/app",
        SignOperation::DetachedSignature,
    )]);

    Pipeline::new(Transformer::new(registry, signers), "SHA256SUMS")
        .with_start_time(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        .run(source.path(), destination.path())
        .unwrap();

    let entries = tar_gz_entries(&fs::read(destination.path().join("manual/linux.tar.gz")).unwrap());
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["app/README", "app/bin/app", "app/bin/app.sig"]);
    assert_eq!(entries[1].1, binary);

    let encoded = String::from_utf8(entries[2].1.clone()).unwrap();
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .unwrap();
    let signature = Signature::from_slice(&raw).unwrap();
    verifying_key.verify(&binary, &signature).unwrap();
}

#[test]
fn test_unreached_registry_entry_fails_without_manifest() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write_file(source.path(), "a.zip", &zip_bytes(&[("present.exe", b"MZ")]));

    let (signer, calls) = CountingSigner::new();
    let signers = Signers::new()
        .with(SignOperation::ExecutableSign, Box::new(signer))
        .with(
            SignOperation::DetachedSignature,
            Box::new(Ed25519Detached::new(signing_key())),
        );
    let registry = registry(&[("a.zip!missing.exe", SignOperation::ExecutableSign)]);

    let err = Pipeline::new(Transformer::new(registry, signers), "SHA256SUMS")
        .run(source.path(), destination.path())
        .unwrap_err();

    match err {
        ReleaseError::Check(CheckError::UnsignedFiles(paths)) => {
            assert_eq!(paths, vec![DeepPath::parse("a.zip!missing.exe").unwrap()]);
        }
        other => panic!("expected a completeness error, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!destination.path().join("SHA256SUMS").exists());
    assert!(!destination.path().join("SHA256SUMS.sig").exists());
}

#[test]
fn test_manifest_covers_top_level_files_and_siblings() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    write_file(source.path(), "source/app-2.3.0.tar.xz", b"source tarball");
    write_file(source.path(), "npm/app-2.3.0.tgz", &tar_gz_bytes(&[("package/index.js", b"1")]));
    write_file(source.path(), "checksums/plain.txt", b"plain");

    let signers = Signers::new().with(
        SignOperation::DetachedSignature,
        Box::new(Ed25519Detached::new(signing_key())),
    );
    let registry = registry(&[("checksums/plain.txt", SignOperation::DetachedSignature)]);

    let summary = Pipeline::new(Transformer::new(registry, signers), "SHA256SUMS")
        .with_source_tarball("source/app-2.3.0.tar.xz")
        .run(source.path(), destination.path())
        .unwrap();

    let manifest = DigestManifest::verify_file(&summary.manifest).unwrap();
    let names: Vec<&str> = manifest.entries().map(|(_, name)| name).collect();
    assert_eq!(
        names,
        [
            "checksums/plain.txt",
            "checksums/plain.txt.sig",
            "npm/app-2.3.0.tgz",
            "source/app-2.3.0.tar.xz",
        ]
    );
    assert!(destination.path().join("SHA256SUMS.sig").is_file());
    assert!(destination.path().join("source/app-2.3.0.tar.xz.sig").is_file());
    // nested entries untouched
    let entries = tar_gz_entries(&fs::read(destination.path().join("npm/app-2.3.0.tgz")).unwrap());
    assert_eq!(entries, vec![("package/index.js".to_string(), b"1".to_vec())]);
}

#[test]
fn test_three_level_nesting() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    let inner = zip_bytes(&[("bin/app.exe", b"MZ inner")]);
    write_file(
        source.path(),
        "chocolatey/app.nupkg",
        &zip_bytes(&[("tools/windows-x64.zip", inner.as_slice()), ("app.nuspec", b"<xml/>")]),
    );

    let (signer, calls) = CountingSigner::new();
    let signers = Signers::new()
        .with(SignOperation::ExecutableSign, Box::new(signer))
        .with(
            SignOperation::DetachedSignature,
            Box::new(Ed25519Detached::new(signing_key())),
        );
    let registry = registry(&[(
        "chocolatey/app.nupkg!tools/windows-x64.zip!bin/app.exe",
        SignOperation::ExecutableSign,
    )]);

    Pipeline::new(Transformer::new(registry, signers), "SHA256SUMS")
        .run(source.path(), destination.path())
        .unwrap();

    let outer = fs::read(destination.path().join("chocolatey/app.nupkg")).unwrap();
    let inner = zip_entry(&outer, "tools/windows-x64.zip");
    assert_eq!(zip_entry(&inner, "bin/app.exe"), b"MZ inner\n#signature 1");
    assert_eq!(zip_entry(&outer, "app.nuspec"), b"<xml/>");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
