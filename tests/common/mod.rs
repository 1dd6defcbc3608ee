//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use release_signers::{SignedArtifact, SigningBackend, SigningResult};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Replacing signer that embeds a call counter, so signing the same bytes
/// twice gives different output.
pub struct CountingSigner {
    pub calls: Arc<AtomicUsize>,
}

impl CountingSigner {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl SigningBackend for CountingSigner {
    fn label(&self) -> &'static str {
        "counting"
    }

    fn sign(&self, _name: &str, content: &[u8]) -> SigningResult<SignedArtifact> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut signed = content.to_vec();
        signed.extend_from_slice(format!("\n#signature {}", n).as_bytes());
        Ok(SignedArtifact::Replaced(signed))
    }

    fn verify(&self, _: &str, original: &[u8], signed: &SignedArtifact) -> SigningResult<()> {
        match signed {
            SignedArtifact::Replaced(bytes) => {
                assert!(bytes.starts_with(original));
                Ok(())
            }
            SignedArtifact::Detached { .. } => unreachable!("counting signer replaces"),
        }
    }
}

pub fn write_file(root: &Path, name: &str, content: &[u8]) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn tar_gz_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_mtime(1_600_000_000);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn zip_entry(archive: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut data = Vec::new();
    entry.read_to_end(&mut data).unwrap();
    data
}

pub fn tar_gz_entries(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(MultiGzDecoder::new(archive));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (name, data)
        })
        .collect()
}
