//! Deterministic series archives
//!
//! Members are written in ascending size order (ties broken by name) with
//! Deflate compression. The canonical metadata is stored as UTF-8 JSON in the
//! archive comment rather than as a member file.

use crate::domain::{CanonicalMetadata, ImportError, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// 1980-01-01T08:00:00Z; zip member times cannot predate 1980
pub const ARCHIVE_EPOCH_FLOOR: i64 = 315_561_600;

/// Largest comment the zip end-of-central-directory record can hold
const MAX_COMMENT_LEN: usize = u16::MAX as usize;

/// Raises `timestamp` (seconds since the epoch) to the archive floor
pub fn clamp_timestamp(timestamp: i64) -> i64 {
    timestamp.max(ARCHIVE_EPOCH_FLOOR)
}

/// One member as listed by [`list_members`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Writes `<out_dir>/<archive_name>.zip` from the files in `content_dir`
///
/// Members are stored as `<archive_name>/<file name>`. Each member keeps its
/// file's modification time, raised to [`ARCHIVE_EPOCH_FLOOR`]. Zip times
/// have two-second resolution, so an odd second is stored one second early.
/// A partially written archive is removed.
///
/// # Errors
///
/// Returns an archive error if the metadata does not fit in the comment
/// field, or an I/O error if a member cannot be read.
pub fn create_archive(
    content_dir: &Path,
    archive_name: &str,
    metadata: &CanonicalMetadata,
    out_dir: &Path,
) -> Result<PathBuf> {
    let comment = serde_json::to_string(metadata)?;
    if comment.len() > MAX_COMMENT_LEN {
        return Err(ImportError::Archive(format!(
            "metadata for {archive_name} is {} bytes, the comment field holds at most {MAX_COMMENT_LEN}",
            comment.len()
        )));
    }

    let mut members = Vec::new();
    for entry in fs::read_dir(content_dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            let name = entry.file_name().to_string_lossy().into_owned();
            members.push((meta.len(), name, entry.path(), meta.modified().ok()));
        }
    }
    members.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

    let out_path = out_dir.join(format!("{archive_name}.zip"));
    let file = File::create(&out_path)?;
    if let Err(e) = write_members(file, archive_name, comment, &members) {
        let _ = fs::remove_file(&out_path);
        return Err(e);
    }

    tracing::debug!(
        archive = %out_path.display(),
        members = members.len(),
        "Archive written"
    );
    Ok(out_path)
}

fn write_members(
    file: File,
    archive_name: &str,
    comment: String,
    members: &[(u64, String, PathBuf, Option<SystemTime>)],
) -> Result<()> {
    let mut writer = ZipWriter::new(BufWriter::new(file));
    writer.set_comment(comment);

    for (size, name, path, modified) in members {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(*size > u64::from(u32::MAX))
            .last_modified_time(zip_time(*modified));
        writer.start_file(format!("{archive_name}/{name}"), options)?;
        io::copy(&mut BufReader::new(File::open(path)?), &mut writer)?;
    }

    let mut inner = writer.finish()?;
    inner.flush()?;
    Ok(())
}

/// Parses the metadata stored in an archive's comment
pub fn read_archive_metadata(path: &Path) -> Result<CanonicalMetadata> {
    let archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    if archive.comment().is_empty() {
        return Err(ImportError::Archive(format!(
            "{} carries no metadata comment",
            path.display()
        )));
    }
    Ok(serde_json::from_slice(archive.comment())?)
}

/// Member names, sizes and timestamps in archive order
pub fn list_members(path: &Path) -> Result<Vec<ArchiveMember>> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    let mut members = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        let modified = file.last_modified();
        members.push(ArchiveMember {
            name: file.name().to_string(),
            size: file.size(),
            modified: chrono::NaiveDate::from_ymd_opt(
                i32::from(modified.year()),
                u32::from(modified.month()),
                u32::from(modified.day()),
            )
            .and_then(|d| {
                d.and_hms_opt(
                    u32::from(modified.hour()),
                    u32::from(modified.minute()),
                    u32::from(modified.second()),
                )
            })
            .map(|dt| dt.and_utc()),
        });
    }
    Ok(members)
}

/// Hex-encoded SHA-256 of the archive file
pub fn archive_digest(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut BufReader::new(File::open(path)?), &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Zip timestamp for a file modification time, raised to the floor
///
/// DOS time keeps seconds halved; odd seconds round down.
fn zip_time(modified: Option<SystemTime>) -> zip::DateTime {
    let seconds = modified
        .map(|t| DateTime::<Utc>::from(t).timestamp())
        .unwrap_or(ARCHIVE_EPOCH_FLOOR);
    let Some(ts) = DateTime::<Utc>::from_timestamp(clamp_timestamp(seconds), 0) else {
        return zip::DateTime::default();
    };
    zip::DateTime::from_date_and_time(
        u16::try_from(ts.year()).unwrap_or(1980),
        ts.month() as u8,
        ts.day() as u8,
        ts.hour() as u8,
        ts.minute() as u8,
        ts.second() as u8,
    )
    .unwrap_or_default()
}
