//! External tool invocation shared by the subprocess-backed signers.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

use crate::error::{SigningError, SigningResult};

const SCRATCH_PREFIX: &str = "sign-release";

/// Allocate a scratch directory for one sign or verify call.
///
/// The directory and its contents are removed when the returned guard drops,
/// which covers early returns through `?`.
pub(crate) fn scratch_dir() -> SigningResult<TempDir> {
    Ok(tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?)
}

/// Scratch directory rooted at `/tmp`.
///
/// gpg-agent sockets live inside GNUPGHOME, and the default macOS temp dir
/// is long enough to overflow the socket path limit.
pub(crate) fn short_scratch_dir() -> SigningResult<TempDir> {
    let base = Path::new("/tmp");
    if base.is_dir() {
        Ok(tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir_in(base)?)
    } else {
        scratch_dir()
    }
}

/// Write `content` to `dir/name` and return the path.
pub(crate) fn stage_file(dir: &Path, name: &str, content: &[u8]) -> SigningResult<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, content)?;
    Ok(path)
}

/// Last component of an archive-internal or filesystem name.
pub(crate) fn base_name(name: &str) -> &str {
    let trimmed = name.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, base)) if !base.is_empty() => base,
        _ => trimmed,
    }
}

/// Run a command to completion, capturing its output.
pub(crate) fn run(backend: &'static str, command: &mut Command) -> SigningResult<()> {
    run_with_stdin(backend, command, None)
}

/// Run a command, feeding `input` on stdin, and fail with the captured
/// output if it exits unsuccessfully.
pub(crate) fn run_with_stdin(
    backend: &'static str,
    command: &mut Command,
    input: Option<&[u8]>,
) -> SigningResult<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    tracing::debug!(backend, program = %program, "running {:?}", command);

    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| SigningError::Spawn {
        backend,
        program: program.clone(),
        source,
    })?;

    // The child is always reaped before returning, even if feeding stdin fails.
    let write_result = match (input, child.stdin.take()) {
        (Some(bytes), Some(mut stdin)) => stdin.write_all(bytes),
        _ => Ok(()),
    };
    let output = child.wait_with_output()?;
    write_result?;

    check_output(backend, program, output)
}

fn check_output(backend: &'static str, program: String, output: Output) -> SigningResult<()> {
    if output.status.success() {
        return Ok(());
    }
    let mut diagnostic = String::from_utf8_lossy(&output.stdout).into_owned();
    diagnostic.push_str(&String::from_utf8_lossy(&output.stderr));
    Err(SigningError::ToolFailed {
        backend,
        program,
        status: output.status,
        output: diagnostic,
    })
}
