//! Job lifecycle: the state machine hosts drive, and the state it exposes.

pub mod controller;
pub mod state;

pub use controller::LifecycleController;
pub use state::{Job, LifecycleState, TerminalOutcome};
