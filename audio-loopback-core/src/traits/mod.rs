pub mod backend;
pub mod stream;
