pub mod job;
pub mod queue;
pub mod worker;

pub use job::{ApplyCommand, Job, JobPriority, JobStatus};
pub use queue::{EnqueueResult, JobQueue, MemoryJobQueue, PostgresJobQueue};
pub use worker::{WorkerPool, WorkerPoolConfig};
