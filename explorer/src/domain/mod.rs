//! Domain value objects shared by the job layer and the query functions.

pub mod key;
pub mod record;
pub mod selection;

pub use key::JobKey;
pub use record::{ColumnSpec, ColumnType, Payload, Record, RecordSchema};
pub use selection::{RepoId, RepoSelection};
