pub mod ll1;
