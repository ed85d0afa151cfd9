//! Tournament evaluation engine
//!
//! Schedules "evaluate model x prompt" work on a bounded pool of workers,
//! scores each pair through an external multi-judge service, and reduces the
//! judges' opinions to a single quantized consensus score.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
