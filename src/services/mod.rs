pub mod cleanup;
pub mod dispatcher;
pub mod facade;
pub mod gating;
pub mod queue;

#[cfg(test)]
mod dispatcher_tests;

pub use facade::{ExecutorDeps, ExecutorFacade};
