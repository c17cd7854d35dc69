pub mod batch;
pub mod unit;
