//! Query jobs: deduplicated submission, bounded execution and polling.

mod harness;
mod job;
mod poll;
mod purge;
mod registry;
mod work;

pub use harness::{ExecutionHarness, HarnessConfig};
pub use job::{Job, JobHandle, JobOutcome, JobSnapshot, JobStatus};
pub use poll::{DisplayDirective, PollAdapter, PollDirective, PollOutcome};
pub use purge::{JobPurgeService, PurgeConfig, PurgeReport};
pub use registry::{JobManager, RegistryStats};
pub use work::{JobWork, WorkFuture};
