mod job;
mod state;

pub use job::{CleanupPolicy, Job, JobUpdate, NewJob};
pub use state::{InvalidTransition, JobState, StateMachine, Transition};
