//! The decompress-and-fan-out pipeline.
//!
//! One run takes a compressed source object, unpacks it and uploads every
//! member back into the same bucket:
//!
//! `Validating -> Fetching -> Persisting -> Detecting -> Decoding -> Uploading
//! -> Verifying -> CleaningUp -> (DeletingSource) -> Done`
//!
//! Every stage before `Done` can end the run with a [`PipelineError`]. Nothing is
//! retried. The scratch blob is owned by the run and removed on every exit path.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::archive::{self, ArchiveFormat, DecodeError, detect};
use crate::config::PipelineConfig;
use crate::s3::{ObjectStore, StoreError};
use crate::scratch::ScratchBlob;

/// Returned by a run that extracted every member
pub const SUCCESS: &str = "Success!";

/// Emit a pipeline checkpoint: `info` for verbose requests, `debug` otherwise
macro_rules! checkpoint {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Input to a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecompressRequest {
    pub bucket: String,
    /// Full key of the compressed source object
    pub key: String,
    pub delete_source_on_success: bool,
    /// Raises checkpoint diagnostics to `info`; never changes behaviour
    pub verbose: bool,
}

impl DecompressRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        DecompressRequest {
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn delete_source_on_success(mut self, delete: bool) -> Self {
        self.delete_source_on_success = delete;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Bucket and key are both required
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.bucket.is_empty() || self.key.is_empty() {
            return Err(PipelineError::Validation);
        }
        Ok(())
    }
}

/// What to do when a member fails to upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadPolicy {
    /// Abort the run at the first failed upload
    #[default]
    StopOnFirstFailure,
    /// Attempt every member, then fail the completeness check
    ContinueAll,
}

/// States of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Fetching,
    Persisting,
    Detecting,
    Decoding,
    Uploading,
    Verifying,
    CleaningUp,
    DeletingSource,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Fetching => "fetching",
            Stage::Persisting => "persisting",
            Stage::Detecting => "detecting",
            Stage::Decoding => "decoding",
            Stage::Uploading => "uploading",
            Stage::Verifying => "verifying",
            Stage::CleaningUp => "cleaning up",
            Stage::DeletingSource => "deleting source",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Error: missing either bucket name or full filename!")]
    Validation,

    #[error("Fetch Error: {0}")]
    Fetch(#[source] StoreError),

    #[error("Unexpected Error: {0}")]
    Scratch(#[source] io::Error),

    #[error("Error: file is not of type zip or gz. Please select a valid file (filename.zip /.gz).")]
    FormatMismatch {
        expected: &'static str,
        found: Option<&'static str>,
    },

    #[error("Decode Error: {0}")]
    Decode(#[source] DecodeError),

    #[error("Error: the zip/gz file was empty!")]
    EmptyArchive,

    #[error("Upload Error: {source}")]
    Upload {
        member: String,
        #[source]
        source: StoreError,
    },

    #[error("Counted {expected} but only decompressed {uploaded}")]
    IncompleteExtraction { expected: usize, uploaded: usize },

    #[error("Delete Error: {0}")]
    SourceDelete(#[source] StoreError),

    #[error("Aborted while {0}")]
    Aborted(Stage),
}

impl PipelineError {
    /// The stage the run failed in
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Validation => Stage::Validating,
            PipelineError::Fetch(_) => Stage::Fetching,
            PipelineError::Scratch(_) => Stage::Persisting,
            PipelineError::FormatMismatch { .. } => Stage::Detecting,
            PipelineError::Decode(_) | PipelineError::EmptyArchive => Stage::Decoding,
            PipelineError::Upload { .. } => Stage::Uploading,
            PipelineError::IncompleteExtraction { .. } => Stage::Verifying,
            PipelineError::SourceDelete(_) => Stage::DeletingSource,
            PipelineError::Aborted(stage) => *stage,
        }
    }
}

/// Last stage a run entered, readable after the run is abandoned
#[derive(Debug)]
struct StageTracker(Mutex<Stage>);

impl StageTracker {
    fn new() -> Self {
        StageTracker(Mutex::new(Stage::Validating))
    }

    fn enter(&self, stage: Stage) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = stage;
    }

    fn current(&self) -> Stage {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn join_error(e: tokio::task::JoinError) -> PipelineError {
    PipelineError::Decode(DecodeError::Io(io::Error::other(e)))
}

/// Decompresses source objects through an injected [`ObjectStore`]
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ObjectStore>, config: PipelineConfig) -> Self {
        Pipeline { store, config }
    }

    /// Run to completion, returning [`SUCCESS`] when every member was uploaded.
    ///
    /// Honours the configured deadline, if any.
    pub async fn run(&self, request: &DecompressRequest) -> Result<&'static str, PipelineError> {
        if let Some(deadline) = self.config.deadline {
            return self.run_with_deadline(request, deadline).await;
        }
        let tracker = StageTracker::new();
        self.execute(request, &tracker).await
    }

    /// Run under an externally imposed deadline.
    ///
    /// When the deadline passes the in-flight stage is abandoned and reported as
    /// [`PipelineError::Aborted`]. Scratch cleanup is best-effort in that case.
    pub async fn run_with_deadline(
        &self,
        request: &DecompressRequest,
        deadline: Duration,
    ) -> Result<&'static str, PipelineError> {
        let tracker = StageTracker::new();
        match tokio::time::timeout(deadline, self.execute(request, &tracker)).await {
            Ok(result) => result,
            Err(_) => {
                let stage = tracker.current();
                tracing::warn!(
                    bucket = %request.bucket,
                    key = %request.key,
                    %stage,
                    ?deadline,
                    "decompress run exceeded its deadline"
                );
                Err(PipelineError::Aborted(stage))
            }
        }
    }

    #[tracing::instrument(name = "decompress", skip_all, fields(bucket = %request.bucket, key = %request.key))]
    async fn execute(
        &self,
        request: &DecompressRequest,
        tracker: &StageTracker,
    ) -> Result<&'static str, PipelineError> {
        let result = self.stages(request, tracker).await;
        match &result {
            Ok(_) => checkpoint!(request.verbose, "decompress finished"),
            Err(e) => checkpoint!(request.verbose, stage = %e.stage(), error = %e, "decompress failed"),
        }
        result
    }

    async fn stages(
        &self,
        request: &DecompressRequest,
        tracker: &StageTracker,
    ) -> Result<&'static str, PipelineError> {
        let verbose = request.verbose;
        let bucket = request.bucket.as_str();

        tracker.enter(Stage::Validating);
        request.validate()?;

        tracker.enter(Stage::Fetching);
        let data = self
            .store
            .get(bucket, &request.key)
            .await
            .map_err(PipelineError::Fetch)?;
        checkpoint!(verbose, bytes = data.len(), "source object found");

        tracker.enter(Stage::Persisting);
        let format = ArchiveFormat::from_key(&request.key);
        let blob = ScratchBlob::persist(&self.config.scratch_dir, format.extension(), &data)
            .await
            .map_err(PipelineError::Scratch)?;
        drop(data);
        checkpoint!(verbose, path = %blob.path().display(), %format, "source persisted to scratch");

        // From here on `blob` is dropped (and its file deleted) on every early return
        tracker.enter(Stage::Detecting);
        let header = blob
            .read_header(detect::SNIFF_LEN)
            .await
            .map_err(PipelineError::Scratch)?;
        let expected = format.content_type();
        let found = detect::sniff_content_type(&header);
        if found != Some(expected) {
            return Err(PipelineError::FormatMismatch { expected, found });
        }

        tracker.enter(Stage::Decoding);
        let path = blob.path().to_path_buf();
        let key = request.key.clone();
        let limit = self.config.max_member_size;
        let mut reader = tokio::task::spawn_blocking(move || archive::open(&path, format, &key, limit))
            .await
            .map_err(join_error)?
            .map_err(PipelineError::Decode)?;
        if reader.is_empty() {
            return Err(PipelineError::EmptyArchive);
        }
        let total = reader.len();
        checkpoint!(verbose, members = total, "archive opened");

        // Members are inflated one at a time, right before their upload
        tracker.enter(Stage::Uploading);
        let mut uploaded = 0usize;
        for index in 0..total {
            let (returned, member) = tokio::task::spawn_blocking(move || {
                let member = reader.read(index);
                (reader, member)
            })
            .await
            .map_err(join_error)?;
            reader = returned;
            let member = member.map_err(PipelineError::Decode)?;

            match self.store.put(bucket, &member.name, member.content).await {
                Ok(location) => {
                    uploaded += 1;
                    checkpoint!(verbose, %location, "File decompressed to S3");
                }
                Err(source) => {
                    tracing::warn!(member = %member.name, error = %source, "member upload failed");
                    if self.config.upload_policy == UploadPolicy::StopOnFirstFailure {
                        return Err(PipelineError::Upload {
                            member: member.name,
                            source,
                        });
                    }
                }
            }
        }
        drop(reader);

        tracker.enter(Stage::Verifying);
        if uploaded != total {
            return Err(PipelineError::IncompleteExtraction {
                expected: total,
                uploaded,
            });
        }

        tracker.enter(Stage::CleaningUp);
        if let Err(e) = blob.remove().await {
            tracing::warn!(error = %e, "failed to remove scratch blob");
        } else {
            checkpoint!(verbose, "Local temp file deleted.");
        }

        if request.delete_source_on_success {
            tracker.enter(Stage::DeletingSource);
            self.store
                .delete(bucket, &request.key)
                .await
                .map_err(PipelineError::SourceDelete)?;
            checkpoint!(verbose, "S3 file '{}' deleted.", request.key);
        }

        tracker.enter(Stage::Done);
        Ok(SUCCESS)
    }
}
