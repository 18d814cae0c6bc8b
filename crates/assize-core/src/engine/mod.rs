pub mod context;
pub mod queue;
pub mod runner;

pub use queue::RunRequest;
pub use runner::{Collaborators, Orchestrator, CANCELLED};
