pub mod app;
pub mod cli;
pub mod context;
pub mod middleware;
