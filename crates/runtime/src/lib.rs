#![doc = include_str!("../../../README.md")]

pub mod allocation;
pub mod error;
pub mod experiment;
pub mod job_result;
pub mod job_tracker;
pub mod placement;
pub mod placers;
pub mod profile;
pub mod runner;
pub mod task;
pub mod task_phase;
