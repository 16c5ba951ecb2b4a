pub mod broadcaster;
pub mod coordinator;
mod reporter;
pub mod worker;
