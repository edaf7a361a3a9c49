use crate::id::WorkerId;
use mcore_ring::MailboxError;
use thiserror::Error;

/// Errors surfaced synchronously by the configuration-phase API; the
/// engine refuses to start while any of these hold.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The addressed worker was never configured.
    #[error("worker {0} is not configured")]
    UnknownWorker(WorkerId),

    /// A second service with the same tag on one worker.
    #[error("duplicate service `{service}` on worker {worker}")]
    DuplicateService {
        service: &'static str,
        worker: WorkerId,
    },

    /// A worker with no actors would never terminate and never drain its
    /// peers' pipes; the topology is rejected up front.
    #[error("worker {0} has no actors")]
    EmptyWorker(WorkerId),

    /// Configuration mutations are only legal before `start`.
    #[error("engine is already running")]
    AlreadyRunning,

    /// An engine needs at least one worker.
    #[error("no workers configured")]
    NoWorkers,

    /// The reserved service slot range is exhausted.
    #[error("too many distinct service tags (max {0})")]
    ServiceSlotsExhausted(u16),

    /// A worker ran out of dynamic slot ids.
    #[error("worker {0} has too many actors")]
    TooManyActors(WorkerId),

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Transport-level sizing rejection.
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

/// Per-worker runtime error bits, aggregated into the engine's result.
pub mod error_bits {
    /// Worker thread setup failed (affinity application).
    pub const BAD_INIT: u64 = 1 << 9;
    /// An actor's `on_init` returned false during startup.
    pub const BAD_ACTOR_INIT: u64 = 1 << 11;
    /// A handler or periodic callback panicked; caught at the bucket
    /// boundary.
    pub const PANIC_IN_HANDLER: u64 = 1 << 12;
}

/// One worker's failure, as reported by [`join`](crate::Engine::join).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerFailure {
    pub worker: WorkerId,
    /// Error bits from [`error_bits`], or 0 if the thread itself panicked
    /// outside any handler.
    pub bits: u64,
}

/// Aggregate failure returned by [`join`](crate::Engine::join) when one or
/// more workers exited with a non-zero error bitmask or panicked.
#[derive(Debug, Error)]
#[error("{} worker(s) exited with errors", .failures.len())]
pub struct EngineError {
    pub failures: Vec<WorkerFailure>,
}
