pub mod config;
pub mod container;
pub mod core;
pub mod flow;
pub mod store;
pub mod tools;
pub mod vector;

// Optional components
pub mod logging;

#[cfg(test)]
mod testing;
