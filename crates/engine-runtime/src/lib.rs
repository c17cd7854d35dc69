pub mod coordinator;
pub mod error;
pub mod events;
pub mod execution;
pub mod reporter;

#[cfg(test)]
mod tests;
