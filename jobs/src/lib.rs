pub mod queue;
pub mod worker;

pub use queue::{ChannelJobQueue, Job, JobQueue, QueueError};
pub use worker::{spawn_workers, RetrySchedule, Worker};
