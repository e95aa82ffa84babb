pub mod breaks;
pub mod clock;
pub mod comprehension;
pub mod constants;
pub mod engine;
pub mod log;
pub mod recorder;

pub use breaks::{BreakCoordinator, BreakEndOutcome, BreakRequirement, BreakState};
pub use clock::{ClockSignal, SessionClock, ThresholdLatch};
pub use comprehension::{ComprehensionHooks, ComprehensionTrigger, NoQuestions};
pub use engine::{ComplianceEngine, EngineEvent};
pub use recorder::SessionRecorder;
