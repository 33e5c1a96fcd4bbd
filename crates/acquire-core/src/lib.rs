pub mod config;
pub mod logging;

pub mod control;
pub mod engine;
pub mod fetcher;
pub mod job;
pub mod planner;
pub mod resolver;
pub mod retry;
pub mod stager;
pub mod storage;
pub mod store;
pub mod transfer;
pub mod url_model;
pub mod verify;

pub use engine::{Engine, EngineError, SubmitOptions};
pub use job::{JobId, JobState, JobStatus};
