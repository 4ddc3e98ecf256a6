//! State module for tracking worker progress
//!
//! # Components
//!
//! - `WorkerState`: the run status of one crawl worker
//! - `WorkerStateCell`: lock-free holder that lets monitors read a worker's
//!   state while only the worker writes it
//! - `WorkerCounters`: per-worker outcome tallies

mod worker_state;

pub use worker_state::{WorkerCounters, WorkerCountersSnapshot, WorkerState, WorkerStateCell};
