//! Task execution, decomposed into focused submodules.
//!
//! - [`context`] - Shared state for a single task run
//! - [`orchestration`] - Part resolution, the error budget and the part loop
//! - [`part`] - One attempt at one part (metadata, dedup check, transfer)
//! - [`finishing`] - Cover, rename, tags, history and cleanup for a finished part
//! - [`progress`] - Part-local to task-wide progress conversion

mod context;
mod finishing;
mod orchestration;
mod part;
mod progress;


pub(crate) use context::TaskContext;
pub(crate) use orchestration::run_task;
