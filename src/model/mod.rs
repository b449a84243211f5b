pub mod grammar;
pub mod types;
