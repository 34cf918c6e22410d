pub mod command;
pub mod diff;
pub mod executor;
mod flight;
pub mod queue;
pub mod runner;
pub mod scan;

#[cfg(test)]
pub mod fake;
