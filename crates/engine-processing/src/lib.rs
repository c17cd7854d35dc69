pub mod download;
pub mod error;
pub mod executor;
pub mod integrity;
pub mod retry;
pub mod transfer;
