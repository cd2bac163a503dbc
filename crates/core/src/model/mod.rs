pub mod metric;
pub mod rule;
