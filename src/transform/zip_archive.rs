//! Rebuild of zip-family archives (`.zip`, `.nupkg`, `.vsix`)
//!
//! Entries whose transform is `Unchanged` are copied raw, compressed bytes
//! and all. Replaced entries are re-deflated with the original permissions
//! and the run's start time; sibling entries are written directly after the
//! entry they belong to.

use std::io::{Cursor, Write};

use chrono::{DateTime, Datelike, Timelike, Utc};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{sibling_entry_name, TransformError, TransformResult, Transformer};
use crate::deep_path::DeepPath;

/// Rebuild the zip archive in `source`, returning the new archive bytes.
pub fn rebuild(
    transformer: &mut Transformer,
    archive_path: &DeepPath,
    source: &[u8],
) -> Result<Vec<u8>, TransformError> {
    let mtime = zip_timestamp(transformer.started_at())?;
    let mut archive = ZipArchive::new(Cursor::new(source))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for index in 0..archive.len() {
        let (name, unix_mode, result) = {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();
            let unix_mode = entry.unix_mode();
            let result = if entry.is_dir() {
                TransformResult::Unchanged
            } else {
                let entry_path = archive_path.append(name.as_str())?;
                transformer.transform(&entry_path, &mut entry)?
            };
            (name, unix_mode, result)
        };

        match result.replacement() {
            Some(replacement) => {
                let mut options = entry_options(mtime, replacement.len());
                if let Some(mode) = unix_mode {
                    options = options.unix_permissions(mode);
                }
                writer.start_file(name.as_str(), options)?;
                writer.write_all(replacement)?;
            }
            None => {
                let raw = archive.by_index_raw(index)?;
                writer.raw_copy_file(raw)?;
            }
        }

        if let Some(sibling) = result.sibling() {
            let mut options = entry_options(mtime, sibling.content.len());
            if let Some(mode) = unix_mode {
                options = options.unix_permissions(mode & !0o111);
            }
            writer.start_file(sibling_entry_name(&name, &sibling.name), options)?;
            writer.write_all(&sibling.content)?;
        }
    }

    Ok(writer.finish()?.into_inner())
}

fn entry_options(mtime: zip::DateTime, len: usize) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(mtime)
        .large_file(len as u64 >= u64::from(u32::MAX))
}

/// Convert to the MS-DOS timestamp zip headers carry (1980..=2107,
/// two-second resolution).
fn zip_timestamp(at: DateTime<Utc>) -> Result<zip::DateTime, TransformError> {
    let out_of_range = || TransformError::Timestamp(at);
    let year = u16::try_from(at.year()).map_err(|_| out_of_range())?;
    zip::DateTime::from_date_and_time(
        year,
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
        at.second() as u8,
    )
    .map_err(|_| out_of_range())
}
