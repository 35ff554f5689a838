pub mod contact_job;

pub use contact_job::{ContactJob, JobStatus};
