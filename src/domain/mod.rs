//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod features;
pub mod calendar;
pub mod model;
pub mod records;
pub mod evaluation;
pub mod pipeline;
pub mod universe;
pub mod config;
pub mod error;
