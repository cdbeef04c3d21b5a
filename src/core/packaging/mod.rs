//! Series packaging
//!
//! - [`packager`] - groups object files by acquisition and archives them
//! - [`archive`] - archive writer, comment reader and digest

pub mod archive;
pub mod packager;

pub use archive::{
    archive_digest, clamp_timestamp, create_archive, list_members, read_archive_metadata,
    ArchiveMember, ARCHIVE_EPOCH_FLOOR,
};
pub use packager::{SeriesPackager, DICOM_FILE_TYPE};
