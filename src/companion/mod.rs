pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{
    CompanionEvent, ControllerOptions, SessionSnapshot, TickSource, WalkController,
};
pub use state::{Effect, SafetySession, SessionState, WalkPlan};
