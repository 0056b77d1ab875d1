// Application Layer - Lifecycle verification services

pub mod constants;
pub mod harness;
pub mod poll;
pub mod reaper;
pub mod reference;
pub mod scanner;
pub mod sequencer;

// Re-exports
pub use harness::Harness;
pub use poll::{PollWaiter, WaitOutcome};
pub use reaper::{ProcessReaper, ReapOutcome, ReapPolicy};
pub use reference::{custom_image_scenario, reference_scenario};
pub use scanner::ProcessScanner;
pub use sequencer::{FailureReason, LifecycleSequencer, PhaseReport, RunOutcome, ScenarioReport};
