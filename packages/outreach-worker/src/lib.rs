pub mod config;
pub mod discovery;
pub mod lease;
pub mod models;
pub mod queue;
pub mod schedule;
pub mod solver;
pub mod store;
pub mod webdriver;
pub mod worker;

pub use config::Config;
pub use lease::{LeaseManager, WorkerContext, LOCK_TIMEOUT_MINUTES, MAX_RETRIES};
pub use models::{ContactJob, JobStatus};
pub use store::{JobStore, PgJobStore};
pub use worker::Worker;
