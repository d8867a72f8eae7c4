//! The prompt queue: an in-memory ordered list of queued items
//! ([`model`]), the timed dispatch loop that drains it ([`scheduler`]), and
//! the pre-dispatch side-effects run before each send ([`automation`]).

pub mod automation;
pub mod model;
pub mod scheduler;

pub use model::{QueueItem, QueueModel, QUEUE_MAX_SIZE};
pub use scheduler::{start_scheduler, DelayParams, DelaySample, SchedulerEvent, SchedulerHandle, SchedulerSnapshot};
