use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{PropdexError, Result};

use super::IndexDocument;

const SNAPSHOT_VERSION: u32 = 1;

/// One committed generation of index contents.
#[derive(Debug, Clone)]
pub(super) struct Segment {
    pub(super) documents: BTreeMap<String, Vec<IndexDocument>>,
    /// Checksum recorded when this generation was committed or loaded.
    pub(super) checksum: String,
}

impl Segment {
    pub(super) fn empty() -> Self {
        let documents = BTreeMap::new();
        let checksum = documents_checksum(&documents);
        Self {
            documents,
            checksum,
        }
    }

    pub(super) fn document_count(&self) -> usize {
        self.documents.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Serialize)]
struct SnapshotFileRef<'a> {
    version: u32,
    checksum: &'a str,
    committed_at: String,
    documents: &'a BTreeMap<String, Vec<IndexDocument>>,
}

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    version: u32,
    checksum: String,
    documents: BTreeMap<String, Vec<IndexDocument>>,
}

pub(super) fn documents_checksum(documents: &BTreeMap<String, Vec<IndexDocument>>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (key, entries) in documents {
        hasher.update(key.as_bytes());
        hasher.update(&[0]);
        for document in entries {
            for (name, value) in document.fields() {
                hasher.update(name.as_bytes());
                hasher.update(&[1]);
                hasher.update(value.to_string().as_bytes());
                hasher.update(&[2]);
            }
            hasher.update(&[3]);
        }
    }
    hasher.finalize().to_hex().to_string()
}

pub(super) fn read_snapshot(path: &Path) -> Result<Option<Segment>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(path)?;
    let file: SnapshotFile = serde_json::from_slice(&raw).map_err(|err| {
        PropdexError::StorageCorrupted(format!("{}: {err}", path.display()))
    })?;
    if file.version != SNAPSHOT_VERSION {
        return Err(PropdexError::Validation(format!(
            "unsupported index snapshot version {} in {}",
            file.version,
            path.display()
        )));
    }
    Ok(Some(Segment {
        documents: file.documents,
        checksum: file.checksum,
    }))
}

pub(super) fn write_snapshot(path: &Path, segment: &Segment) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = SnapshotFileRef {
        version: SNAPSHOT_VERSION,
        checksum: &segment.checksum,
        committed_at: Utc::now().to_rfc3339(),
        documents: &segment.documents,
    };
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);
    {
        let mut out = fs::File::create(&tmp_path)?;
        serde_json::to_writer(&mut out, &file)?;
        out.flush()?;
        out.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
