pub mod common;
pub mod ll1;
