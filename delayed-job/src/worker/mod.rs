//! Worker side: claim loop, execution and shutdown

pub mod executor;
pub mod launcher;
pub mod lifecycle;
pub mod scheduler;

pub use executor::{ExecutionOutcome, Executor, Settlement, SHUTDOWN_ABANDON_MESSAGE};
pub use launcher::TaskLauncher;
pub use lifecycle::{Lifecycle, LoopTiming, WorkerState};
pub use scheduler::{InFlight, Scheduler, TickOutcome};
