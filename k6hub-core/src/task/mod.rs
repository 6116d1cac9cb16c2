//! Load-test tasks and the lease protocol payloads

mod types;

pub use types::{
    Ack, JobPayload, NewTask, PollResponse, ReportedStatus, Stage, StatusReport, Task,
    TaskConfig, TaskQuery, TaskStatistics, TaskStatus, TaskUpdate, TriggerType, Visibility,
};
