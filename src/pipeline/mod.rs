mod canonical;
mod orchestrator;
mod poll;
mod retry;
mod single_flight;

pub use canonical::canonicalize_url;
pub use orchestrator::{Collaborators, PipelineOrchestrator};
pub use poll::{wait_for_terminal, PollOutcome, PollSchedule};
pub use retry::with_backoff;
pub use single_flight::{FlightGuard, SingleFlight};
