//! Download queue and the adapters around it

pub mod error;
pub mod extractor;
pub mod job;
pub mod progress;
pub mod proxy;
pub mod queue;
pub mod split;
pub mod uploader;
pub mod ytdlp;
pub mod ytdlp_errors;

// Re-exports for convenience
pub use error::{ExtractionFailure, FailureKind, JobFailure};
pub use extractor::{Extractor, ProgressSink};
pub use job::{Job, JobId, JobKind, JobRequest, JobStatus, Quality};
pub use progress::Messenger;
pub use proxy::{ProxyDescriptor, ProxyRotator};
pub use queue::{Enqueued, JobEvent, QueueProcessor};
pub use uploader::Uploader;
pub use ytdlp::YtDlpExtractor;
