pub mod lexer;
pub mod ll1;
pub mod types;
