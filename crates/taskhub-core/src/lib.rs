pub mod access;
pub mod assignment;
pub mod attachment;
pub mod comment;
pub mod config;
pub mod db;
pub mod deadline;
pub mod department;
pub mod error;
pub mod io;
pub mod notification;
pub mod paths;
pub mod project;
pub mod report;
pub mod subtask;
pub mod tag;
pub mod task;
pub mod task_log;
pub mod types;
pub mod user;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Result, TaskhubError};
