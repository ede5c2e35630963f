//! Directory monitoring: persistent scan rules, file discovery, archival,
//! and enqueueing of upload jobs.
//!
//! The scheduling loop that drives scans lives outside this crate; it loads
//! enabled entries, calls [`DirmonEntry::each`] to discover files, and
//! [`DirmonEntry::later`] per discovered file.

pub mod archive;
pub mod entry;
pub mod scan;
pub mod upload;

pub use archive::DEFAULT_ARCHIVE_DIRECTORY;
pub use entry::{
    DIRMON_COLLECTION, DirmonEntry, DirmonError, DirmonEvent, DirmonState, ValidationError,
    counts_by_state, next_entry_state,
};
pub use upload::{UPLOAD_FILE_JOB, UploadFileJob, upload_file_job_type};
