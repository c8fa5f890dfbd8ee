//! Run control: the gate, the per-run state machine and the stepper loop.

#[cfg(test)]
mod controller_tests;
mod gate;
mod run;
mod stepper;

pub use crate::core::RunState;
pub use gate::RunGate;
pub use run::{RunController, StepOutcome};
pub use stepper::StepperLoop;
