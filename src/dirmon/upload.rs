//! The upload-file job constructor contract.
//!
//! Dirmon does not process file contents itself; it enqueues an upload job
//! carrying both file names and the minted job id. The upload job's perform
//! handler is supplied by the host (it knows how to feed the archived file
//! into the target job class); this module only defines the type
//! registration and the constructor.

use std::path::PathBuf;

use serde_json::{Map, Value, json};

use crate::engine::Engine;
use crate::job::factory::{self, FactoryError};
use crate::job::job::Job;
use crate::job::registry::JobType;
use crate::types::JobId;

/// Class name the upload job is registered and persisted under.
pub const UPLOAD_FILE_JOB: &str = "upload_file_job";

/// The upload job type as registered by the engine at construction.
///
/// Declares the settable attributes; the host replaces this registration
/// with one carrying a real perform handler.
pub fn upload_file_job_type() -> JobType {
    JobType::new(UPLOAD_FILE_JOB)
        .with_attribute("target_job_class_name")
        .with_attribute("properties")
        .with_attribute("upload_file_name")
        .with_attribute("original_file_name")
        .with_attribute("job_id")
}

/// Constructor parameters for an upload job.
///
/// `job_class_name` names the class the uploaded file will feed, not the
/// upload job itself; it is persisted as `target_job_class_name` so it
/// cannot clash with the job record's own class name.
#[derive(Debug, Clone)]
pub struct UploadFileJob {
    pub job_class_name: String,
    pub properties: Map<String, Value>,
    pub description: String,
    pub upload_file_name: PathBuf,
    pub original_file_name: PathBuf,
    pub job_id: JobId,
}

impl UploadFileJob {
    /// Persists a queued upload job carrying these fields.
    ///
    /// Always persists, regardless of inline mode: the discovered file has
    /// already been archived, so the enqueue must not be rerouted to a
    /// synchronous run that could lose it on failure.
    pub fn create(self, engine: &Engine) -> Result<Job, FactoryError> {
        let job = factory::build_with(engine, UPLOAD_FILE_JOB, "perform", vec![], |job| {
            job.description = Some(self.description.clone());
            job.fields
                .insert("target_job_class_name".into(), json!(self.job_class_name));
            job.fields
                .insert("properties".into(), Value::Object(self.properties.clone()));
            job.fields
                .insert("upload_file_name".into(), json!(self.upload_file_name));
            job.fields
                .insert("original_file_name".into(), json!(self.original_file_name));
            job.fields.insert("job_id".into(), json!(self.job_id));
        })?;
        engine
            .store()
            .insert(crate::job::JOBS_COLLECTION, job.to_document()?)?;
        Ok(job)
    }
}
