pub mod events;
pub mod progress;
pub mod records;
pub mod transfer;
