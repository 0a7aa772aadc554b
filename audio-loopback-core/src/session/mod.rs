pub mod context;
pub mod engine;
pub mod negotiator;
