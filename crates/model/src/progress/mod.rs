pub mod counters;
pub mod record;
