// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] spawns a built command line as a supervised child.
//! - [`process`] finds and kills a child's whole process tree.
//! - [`task_runner`] drives one probe from launch to its published result.
//! - [`executor_loop`] dispatches ready probes under a concurrency limit.

pub mod command;
pub mod executor_loop;
pub mod process;
pub mod task_runner;

pub use command::{CapturedOutput, CommandLine, RunningProcess, spawn};
pub use executor_loop::spawn_executor;
