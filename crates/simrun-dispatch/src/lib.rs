//! simrun Dispatch - Running tasks on remote workers
//!
//! Jobs are written to a [`JobQueue`] shared by several processes, possibly
//! on different hosts. A [`Worker`] claims eligible jobs, executes them and
//! uploads the result bytes to the blob store under the job id, where the
//! submitting [`Dispatcher`] picks them up.

pub mod dispatcher;
pub mod error;
pub mod job;
pub mod queue;
pub mod remote;
pub mod worker;

pub use dispatcher::{Dispatcher, JobState};
pub use error::{DispatchError, Result};
pub use job::{Job, JobId, JobStatus};
pub use queue::{FsJobQueue, JobQueue};
pub use remote::RemoteTask;
pub use worker::{JobExecutor, Worker};
