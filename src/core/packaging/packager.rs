//! Series packaging
//!
//! Groups the object files of one retrieved series by acquisition number and
//! writes one archive per acquisition.

use super::archive::{clamp_timestamp, create_archive};
use crate::core::normalize::normalize;
use crate::core::sources::{DicomRecord, IdentificationPolicy};
use crate::domain::{CanonicalMetadata, FileEntry, ImportError, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Filename prefix the store uses for objects without a value
const NO_VALUE_SENTINEL: &str = "(none)";
const NO_VALUE_PLACEHOLDER: &str = "NA";

/// Archive type recorded in the acquisition file entry
pub const DICOM_FILE_TYPE: &str = "dicom";

struct Acquisition {
    staging: PathBuf,
    name: String,
    metadata: CanonicalMetadata,
}

/// An object file moved into a staging directory
struct StagedFile {
    original: PathBuf,
    staged: PathBuf,
    modified: Option<SystemTime>,
}

/// Packs a directory of object files into per-acquisition archives
#[derive(Debug, Clone, Default)]
pub struct SeriesPackager {
    policy: IdentificationPolicy,
}

impl SeriesPackager {
    pub fn new(policy: IdentificationPolicy) -> Self {
        Self { policy }
    }

    /// Packs `directory`, writing staging directories and archives beside it
    ///
    /// The object files are moved out of `directory` once every archive is
    /// written. On failure they are put back where they were.
    pub fn pack(&self, directory: &Path) -> Result<BTreeMap<PathBuf, CanonicalMetadata>> {
        let out_dir = directory.parent().ok_or_else(|| {
            ImportError::Validation(format!("{} has no parent directory", directory.display()))
        })?;
        self.pack_into(directory, out_dir)
    }

    /// Packs `directory` with staging directories and archives under `out_dir`
    ///
    /// Every file is parsed before any is moved, so a malformed object fails
    /// the whole series without leaving partial archives. Objects are grouped
    /// by acquisition uid: a missing Acquisition Number and Acquisition
    /// Number 1 share an archive.
    ///
    /// # Returns
    ///
    /// Archive path to the acquisition's canonical metadata, which carries a
    /// `{name: <archive>, type: "dicom"}` file entry.
    pub fn pack_into(
        &self,
        directory: &Path,
        out_dir: &Path,
    ) -> Result<BTreeMap<PathBuf, CanonicalMetadata>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let records = files
            .into_iter()
            .map(|path| DicomRecord::open(&path, &self.policy).map(|record| (path, record)))
            .collect::<Result<Vec<_>>>()?;

        let mut acquisitions: BTreeMap<String, Acquisition> = BTreeMap::new();
        let mut staged = Vec::with_capacity(records.len());
        let mut written = Vec::new();
        let result = self
            .stage(&records, out_dir, &mut acquisitions, &mut staged)
            .and_then(|()| {
                acquisitions
                    .values_mut()
                    .map(|acq| {
                        let archive = Self::archive(acq, out_dir)?;
                        written.push(archive.0.clone());
                        Ok(archive)
                    })
                    .collect::<Result<BTreeMap<_, _>>>()
            });

        let archives = match result {
            Ok(archives) => archives,
            Err(e) => {
                restore(&staged, &written);
                remove_staging(&acquisitions);
                return Err(e);
            }
        };
        remove_staging(&acquisitions);

        tracing::debug!(
            series = %directory.display(),
            files = records.len(),
            archives = archives.len(),
            "Series packed"
        );
        Ok(archives)
    }

    fn stage(
        &self,
        records: &[(PathBuf, DicomRecord)],
        out_dir: &Path,
        acquisitions: &mut BTreeMap<String, Acquisition>,
        staged: &mut Vec<StagedFile>,
    ) -> Result<()> {
        for (path, record) in records {
            let uid = record.acquisition_uid();
            if !acquisitions.contains_key(&uid) {
                let name = format!("{uid}.dicom");
                let staging = out_dir.join(&name);
                fs::create_dir(&staging)?;

                let mut metadata = normalize(record)?;
                metadata.patient_id = record.patient_id.clone();
                acquisitions.insert(
                    uid.clone(),
                    Acquisition {
                        staging,
                        name,
                        metadata,
                    },
                );
            }
            let Some(acq) = acquisitions.get(&uid) else {
                continue;
            };

            let target = acq
                .staging
                .join(format!("{}.dcm", staged_file_name(path)));
            let modified = fs::metadata(path)?.modified().ok();
            move_file(path, &target)?;
            staged.push(StagedFile {
                original: path.clone(),
                staged: target.clone(),
                modified,
            });

            let seconds = record
                .acquisition_timestamp
                .map(|ts| ts.timestamp())
                .unwrap_or_default();
            set_modified(&target, epoch_time(clamp_timestamp(seconds)))?;
        }
        Ok(())
    }

    fn archive(acq: &mut Acquisition, out_dir: &Path) -> Result<(PathBuf, CanonicalMetadata)> {
        acq.metadata
            .push_file(FileEntry::new(format!("{}.zip", acq.name), DICOM_FILE_TYPE));
        let path = create_archive(
            &acq.staging,
            &acq.name,
            &acq.metadata.without_patient_id(),
            out_dir,
        )?;
        Ok((path, acq.metadata.clone()))
    }
}

/// Moves staged object files back and removes archives already written
fn restore(staged: &[StagedFile], written: &[PathBuf]) {
    for file in staged.iter().rev() {
        let moved = move_file(&file.staged, &file.original).and_then(|()| match file.modified {
            Some(time) => set_modified(&file.original, time),
            None => Ok(()),
        });
        if let Err(e) = moved {
            tracing::error!(
                file = %file.original.display(),
                staged = %file.staged.display(),
                error = %e,
                "Could not restore object file"
            );
        }
    }
    for archive in written {
        if let Err(e) = fs::remove_file(archive) {
            tracing::warn!(archive = %archive.display(), error = %e, "Could not remove archive");
        }
    }
}

fn remove_staging(acquisitions: &BTreeMap<String, Acquisition>) {
    for acq in acquisitions.values() {
        if acq.staging.exists() {
            if let Err(e) = fs::remove_dir_all(&acq.staging) {
                tracing::warn!(
                    staging = %acq.staging.display(),
                    error = %e,
                    "Could not remove staging directory"
                );
            }
        }
    }
}

/// File name with the no-value sentinel replaced by a placeholder
fn staged_file_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_prefix(NO_VALUE_SENTINEL) {
        Some(rest) => format!("{NO_VALUE_PLACEHOLDER}{rest}"),
        None => name,
    }
}

fn epoch_time(seconds: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(u64::try_from(seconds).unwrap_or_default())
}

fn set_modified(path: &Path, time: SystemTime) -> Result<()> {
    File::options().write(true).open(path)?.set_modified(time)?;
    Ok(())
}

/// Renames, falling back to copy and remove across filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_file_name() {
        assert_eq!(staged_file_name(Path::new("/x/(none)_1")), "NA_1");
        assert_eq!(staged_file_name(Path::new("/x/1.2.3")), "1.2.3");
    }

    #[test]
    fn test_move_file() {
        let tmp = tempfile::tempdir().unwrap();
        let from = tmp.path().join("a");
        let to = tmp.path().join("b");
        fs::write(&from, b"x").unwrap();
        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"x");
    }

    #[test]
    fn test_malformed_file_aborts_without_staging() {
        let tmp = tempfile::tempdir().unwrap();
        let series = tmp.path().join("series");
        fs::create_dir(&series).unwrap();
        fs::write(series.join("broken"), b"not dicom").unwrap();

        let err = SeriesPackager::default().pack(&series).unwrap_err();
        assert!(matches!(err, ImportError::MalformedSourceRecord(_)));
        assert!(series.join("broken").exists());
        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_empty_directory_packs_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let series = tmp.path().join("series");
        fs::create_dir(&series).unwrap();
        assert!(SeriesPackager::default().pack(&series).unwrap().is_empty());
    }
}
