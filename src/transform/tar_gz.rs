//! Single-pass rebuild of gzip-compressed tarballs
//!
//! Entries are decoded, dispatched, and re-encoded in order; nothing is
//! dropped. PAX records travel with their entry. Replaced entries get the
//! new size and the run's start time; sibling entries follow the entry they
//! belong to.

use std::io::{self, Read};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder, Entry, EntryType, Header};

use super::{sibling_entry_name, SiblingFile, TransformError, Transformer};
use crate::deep_path::DeepPath;

/// Rebuild the tarball read from `source`, returning the new `.tar.gz` bytes.
pub fn rebuild(
    transformer: &mut Transformer,
    archive_path: &DeepPath,
    source: &mut dyn Read,
) -> Result<Vec<u8>, TransformError> {
    let mtime = start_mtime(transformer);
    let mut archive = Archive::new(MultiGzDecoder::new(source));
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let link_name = entry
            .link_name_bytes()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        let mut header = entry.header().clone();
        let mut pax = pax_records(&mut entry)?;
        let entry_path = archive_path.append(name.as_str())?;

        let declared = entry.size();
        let mut content = Vec::with_capacity(usize::try_from(declared).unwrap_or(0));
        entry.read_to_end(&mut content)?;
        if content.len() as u64 != declared {
            return Err(TransformError::CorruptEntry {
                path: entry_path,
                declared,
                actual: content.len() as u64,
            });
        }

        let result = transformer.transform(&entry_path, &mut content.as_slice())?;

        let data = match result.replacement() {
            Some(replacement) => {
                stamp_replaced(&mut header, replacement.len() as u64, mtime);
                stamp_pax_times(&mut pax, mtime);
                replacement
            }
            None => content.as_slice(),
        };
        if !pax.is_empty() {
            builder.append_pax_extensions(
                pax.iter().map(|(key, value)| (key.as_str(), value.as_slice())),
            )?;
        }
        append_entry(&mut builder, &mut header, &name, link_name.as_deref(), data)?;

        if let Some(sibling) = result.sibling() {
            let mut sibling_header = sibling_header(&header, sibling, mtime)?;
            builder.append_data(
                &mut sibling_header,
                sibling_entry_name(&name, &sibling.name),
                &sibling.content[..],
            )?;
        }
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

fn start_mtime(transformer: &Transformer) -> u64 {
    u64::try_from(transformer.started_at().timestamp()).unwrap_or(0)
}

/// PAX records of `entry`, minus the ones the builder regenerates from the
/// name, link target and size it is given.
fn pax_records<R: Read>(entry: &mut Entry<'_, R>) -> io::Result<Vec<(String, Vec<u8>)>> {
    let mut records = Vec::new();
    let Some(extensions) = entry.pax_extensions()? else {
        return Ok(records);
    };
    for extension in extensions {
        let extension = extension?;
        let key = extension
            .key()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if matches!(key, "path" | "linkpath" | "size") {
            continue;
        }
        records.push((key.to_string(), extension.value_bytes().to_vec()));
    }
    Ok(records)
}

/// Reset whichever PAX timestamps a replaced entry carries.
fn stamp_pax_times(records: &mut [(String, Vec<u8>)], mtime: u64) {
    for (key, value) in records.iter_mut() {
        if matches!(key.as_str(), "mtime" | "atime" | "ctime") {
            *value = mtime.to_string().into_bytes();
        }
    }
}

/// Update size and timestamps of an entry whose content was replaced.
///
/// Only GNU headers carry access/change times; other formats keep just the
/// modification time.
fn stamp_replaced(header: &mut Header, size: u64, mtime: u64) {
    header.set_size(size);
    header.set_mtime(mtime);
    if let Some(gnu) = header.as_gnu_mut() {
        gnu.set_atime(mtime);
        gnu.set_ctime(mtime);
    }
}

/// Header for a sibling file: regular, non-executable, same owner as the
/// entry it accompanies.
fn sibling_header(original: &Header, sibling: &SiblingFile, mtime: u64) -> io::Result<Header> {
    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::Regular);
    header.set_size(sibling.content.len() as u64);
    header.set_mode(original.mode()? & !0o111);
    header.set_uid(original.uid()?);
    header.set_gid(original.gid()?);
    if let Ok(Some(user)) = original.username() {
        header.set_username(user)?;
    }
    if let Ok(Some(group)) = original.groupname() {
        header.set_groupname(group)?;
    }
    header.set_mtime(mtime);
    Ok(header)
}

/// Append an entry, re-emitting long names (and link targets) as needed.
fn append_entry<W: io::Write>(
    builder: &mut Builder<W>,
    header: &mut Header,
    name: &str,
    link_name: Option<&str>,
    data: &[u8],
) -> io::Result<()> {
    let entry_type = header.entry_type();
    match link_name {
        Some(target) if entry_type.is_symlink() || entry_type.is_hard_link() => {
            builder.append_link(header, name, target)
        }
        _ => builder.append_data(header, name, data),
    }
}
