//! Ratekeeper - In-process Request Admission Control
//!
//! This crate implements a sliding-log rate limiter that decides in constant
//! time whether a request is admitted, and how long a rejected caller should
//! wait. Expired log entries are removed by background cleanup tasks, and a
//! keyed layer multiplexes one limiter per key while reclaiming idle ones.

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod scheduler;
pub mod server;
