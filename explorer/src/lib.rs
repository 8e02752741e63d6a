//! Explorer: asynchronous query jobs with a shared result cache.
//!
//! Visualizations poll [`jobs::PollAdapter`] on a timer. The first poll for a
//! (query, repo selection) pair starts one deduplicated background job; later
//! polls observe it until the result lands in the cache.

pub mod api;
pub mod cache;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod queries;
pub mod services;

pub use error::{Error, Result};
