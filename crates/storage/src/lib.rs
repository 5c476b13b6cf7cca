//! Storage layer: all-or-nothing artifact writes.
//!
//! Content is fully buffered, written to a temp file in the destination
//! directory, then renamed over the target, so a failed write never leaves a
//! partial file behind.

use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

pub fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("create directory {:?}", dir))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {:?}", dir))?;
    tmp.write_all(contents)
        .with_context(|| format!("write temp file for {:?}", path))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync temp file for {:?}", path))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("replace {:?}", path))?;

    debug!(path = %path.display(), bytes = contents.len(), "artifact written");
    Ok(())
}

/// Serializes `value` as pretty JSON (2-space indent) and writes it atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let mut buf = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serialize {:?}", path))?;
    buf.push(b'\n');
    write_atomic(path, &buf)
}

pub fn write_text(path: &Path, text: &str) -> anyhow::Result<()> {
    write_atomic(path, text.as_bytes())
}
