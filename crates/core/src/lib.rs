pub mod accumulator;
pub mod config;
pub mod error;
pub mod expr;
pub mod model;
pub mod policy;
pub mod rules;
pub mod sampler;
pub mod tags;
pub mod time;

pub use error::{ProberError, Result};
