use crate::actor::{Actor, ActorCell};
use crate::error::{error_bits, ConfigError, EngineError, WorkerFailure};
use crate::id::{ActorId, SlotId, WorkerId, WorkerIdSet, FIRST_DYNAMIC_SLOT, MAX_WORKERS};
use crate::service::{slot_for_tag, Service};
use crate::signal;
use crate::worker::{SharedComms, Worker};
use mcore_ring::{Mailbox, RingConfig, Slot};
use std::any::TypeId;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

#[cfg(unix)]
const DEFAULT_SIGNALS: [i32; 2] = [libc::SIGINT, libc::SIGTERM];
#[cfg(not(unix))]
const DEFAULT_SIGNALS: [i32; 0] = [];

struct PendingActor {
    build: Box<dyn FnOnce() -> ActorCell + Send>,
}

/// Pre-start configuration of one worker: affinity, idle latency, and the
/// actors it will host. Obtained from [`Engine::worker`].
pub struct WorkerConfig {
    id: WorkerId,
    affinity: WorkerIdSet,
    latency_ns: Option<u64>,
    next_slot: SlotId,
    pending: Vec<PendingActor>,
    services: HashSet<TypeId>,
}

impl WorkerConfig {
    fn new(id: WorkerId) -> Self {
        Self {
            id,
            affinity: WorkerIdSet::new(),
            latency_ns: None,
            next_slot: FIRST_DYNAMIC_SLOT,
            pending: Vec::new(),
            services: HashSet::new(),
        }
    }

    /// Pins the worker thread to the given CPU ids. An empty set (the
    /// default) leaves scheduling to the OS.
    pub fn set_affinity(&mut self, cpus: WorkerIdSet) -> &mut Self {
        self.affinity = cpus;
        self
    }

    /// Bounds the worker's idle wait. Zero (the default) busy-spins for
    /// the lowest latency at 100% CPU; anything larger lets the worker
    /// sleep up to that long when idle.
    pub fn set_latency(&mut self, latency: Duration) -> &mut Self {
        self.latency_ns = Some(latency.as_nanos() as u64);
        self
    }

    /// Schedules `actor` to run on this worker. Its id is assigned now;
    /// `on_init` runs on the worker thread at start.
    pub fn add_actor<A: Actor + Send>(&mut self, actor: A) -> Result<ActorId, ConfigError> {
        if self.next_slot == SlotId::MAX {
            return Err(ConfigError::TooManyActors(self.id));
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        Ok(self.push_pending(actor, slot))
    }

    /// Schedules service `S` on this worker. At most one instance of a
    /// service tag per worker; its slot comes from the reserved range, so
    /// [`service_id`](crate::service_id) can address it from anywhere.
    pub fn add_service<S: Service + Send>(&mut self, service: S) -> Result<ActorId, ConfigError> {
        let tag = TypeId::of::<S::Tag>();
        let slot = slot_for_tag(tag)?;
        if !self.services.insert(tag) {
            return Err(ConfigError::DuplicateService {
                service: std::any::type_name::<S>(),
                worker: self.id,
            });
        }
        Ok(self.push_pending(service, slot))
    }

    fn push_pending<A: Actor + Send>(&mut self, actor: A, slot: SlotId) -> ActorId {
        let id = ActorId::new(self.id, slot);
        self.pending.push(PendingActor {
            build: Box::new(move || ActorCell::new(actor, id)),
        });
        id
    }
}

struct Running {
    threads: Vec<(WorkerId, JoinHandle<u64>)>,
    comms: Arc<SharedComms>,
}

/// Cloneable handle that can stop a running engine from another thread
/// (or after the fact; stopping a finished engine is a no-op).
#[derive(Clone)]
pub struct ShutdownHandle {
    comms: Weak<SharedComms>,
}

impl ShutdownHandle {
    /// Requests graceful shutdown. Idempotent.
    pub fn stop(&self) {
        if let Some(comms) = self.comms.upgrade() {
            comms.request_stop();
        }
    }
}

/// The engine controller: owns worker configuration, spawns one thread
/// per worker at [`start`](Engine::start), and reaps them at
/// [`join`](Engine::join).
///
/// ```no_run
/// use mcore::{Actor, Context, Engine};
///
/// struct Idle;
/// impl Actor for Idle {
///     fn on_init(&mut self, ctx: &mut Context<'_>) -> bool {
///         ctx.kill(); // nothing to do
///         true
///     }
/// }
///
/// let mut engine = Engine::new(2);
/// engine.worker(0).unwrap().add_actor(Idle).unwrap();
/// engine.worker(1).unwrap().add_actor(Idle).unwrap();
/// engine.start().unwrap();
/// engine.join().unwrap();
/// ```
pub struct Engine {
    workers: Vec<WorkerConfig>,
    ring_bits: u8,
    default_latency_ns: u64,
    handled_signals: Vec<i32>,
    ignored_signals: Vec<i32>,
    running: Option<Running>,
    failures: Vec<WorkerFailure>,
}

impl Engine {
    /// An engine with workers `0..n_workers`.
    ///
    /// # Panics
    ///
    /// Panics if `n_workers` exceeds [`MAX_WORKERS`].
    pub fn new(n_workers: usize) -> Self {
        assert!(
            n_workers <= MAX_WORKERS,
            "at most {MAX_WORKERS} workers supported"
        );
        Self {
            workers: (0..n_workers as WorkerId).map(WorkerConfig::new).collect(),
            ring_bits: RingConfig::default().ring_bits,
            default_latency_ns: 0,
            handled_signals: DEFAULT_SIGNALS.to_vec(),
            ignored_signals: Vec::new(),
            running: None,
            failures: Vec::new(),
        }
    }

    /// Number of configured workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Configuration access for one worker. Only legal before `start`.
    pub fn worker(&mut self, id: WorkerId) -> Result<&mut WorkerConfig, ConfigError> {
        if self.running.is_some() {
            return Err(ConfigError::AlreadyRunning);
        }
        self.workers
            .get_mut(id as usize)
            .ok_or(ConfigError::UnknownWorker(id))
    }

    /// Shorthand for `worker(id)?.add_actor(actor)`.
    pub fn add_actor<A: Actor + Send>(
        &mut self,
        id: WorkerId,
        actor: A,
    ) -> Result<ActorId, ConfigError> {
        self.worker(id)?.add_actor(actor)
    }

    /// Shorthand for `worker(id)?.add_service(service)`.
    pub fn add_service<S: Service + Send>(
        &mut self,
        id: WorkerId,
        service: S,
    ) -> Result<ActorId, ConfigError> {
        self.worker(id)?.add_service(service)
    }

    /// Default idle latency for workers without an explicit
    /// [`set_latency`](WorkerConfig::set_latency). Zero = busy spin.
    pub fn set_latency(&mut self, latency: Duration) {
        self.default_latency_ns = latency.as_nanos() as u64;
    }

    /// Mailbox ring capacity as a power of two (default 12 = 4096 slots
    /// per producer). Mainly for tests that want tiny rings to force
    /// backpressure.
    pub fn set_ring_bits(&mut self, ring_bits: u8) {
        // Validated eagerly so the panic points here, not into start().
        let _ = RingConfig::new(ring_bits, false);
        self.ring_bits = ring_bits;
    }

    /// Adds `signum` to the signals that trigger graceful shutdown
    /// (SIGINT and SIGTERM are handled by default on unix).
    pub fn register_signal(&mut self, signum: i32) {
        if !self.handled_signals.contains(&signum) {
            self.handled_signals.push(signum);
        }
    }

    /// Removes `signum` from the handled set, restoring the OS default
    /// disposition at start.
    pub fn unregister_signal(&mut self, signum: i32) {
        if self.handled_signals.contains(&signum) {
            self.handled_signals.retain(|s| *s != signum);
            signal::restore_default(signum);
        }
    }

    /// Suppresses `signum` entirely (e.g. SIGPIPE).
    pub fn ignore_signal(&mut self, signum: i32) {
        if !self.ignored_signals.contains(&signum) {
            self.ignored_signals.push(signum);
        }
    }

    /// Spawns every worker thread and returns once all are launched. The
    /// workers instantiate their actors, run `on_init`, meet at the
    /// startup barrier and begin ticking; an `on_init` failure anywhere
    /// aborts the whole start (visible as an error from `join`).
    pub fn start(&mut self) -> Result<(), ConfigError> {
        if self.running.is_some() {
            return Err(ConfigError::AlreadyRunning);
        }
        if self.workers.is_empty() {
            return Err(ConfigError::NoWorkers);
        }
        for cfg in &self.workers {
            if cfg.pending.is_empty() {
                return Err(ConfigError::EmptyWorker(cfg.id));
            }
        }

        let n = self.workers.len();
        let ring_config = RingConfig::new(self.ring_bits, false);
        let mut mailboxes = Vec::with_capacity(n);
        for cfg in &self.workers {
            let latency = cfg.latency_ns.unwrap_or(self.default_latency_ns);
            mailboxes.push(Mailbox::<Slot>::new(n, ring_config, latency)?);
        }
        let comms = Arc::new(SharedComms::new(mailboxes));

        signal::rearm();
        for signum in &self.handled_signals {
            signal::install(*signum);
        }
        for signum in &self.ignored_signals {
            signal::ignore(*signum);
        }

        self.failures.clear();

        let mut threads = Vec::with_capacity(n);
        for cfg in &mut self.workers {
            let id = cfg.id;
            let affinity = cfg.affinity;
            let pending = std::mem::take(&mut cfg.pending);
            let next_slot = cfg.next_slot;
            let worker_comms = Arc::clone(&comms);

            let spawned = std::thread::Builder::new()
                .name(format!("mcore-worker-{id}"))
                .spawn(move || {
                    let mut initial_bits = 0;
                    if !affinity.is_empty() && !apply_affinity(&affinity) {
                        initial_bits |= error_bits::BAD_INIT;
                        tracing::warn!(worker = id, "failed to apply cpu affinity");
                    }
                    let mut worker = Worker::new(id, worker_comms, initial_bits);
                    for p in pending {
                        worker.install((p.build)());
                    }
                    worker.seed_dynamic_slots(next_slot);
                    worker.run()
                });
            match spawned {
                Ok(handle) => threads.push((id, handle)),
                Err(e) => {
                    // Unwind the ones already launched.
                    comms.request_stop();
                    for (_, handle) in threads {
                        let _ = handle.join();
                    }
                    return Err(ConfigError::Spawn(e));
                }
            }
        }

        debug!(workers = n, "engine started");
        self.running = Some(Running { threads, comms });
        Ok(())
    }

    /// A handle other threads can use to stop this engine.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            comms: self
                .running
                .as_ref()
                .map_or_else(Weak::new, |r| Arc::downgrade(&r.comms)),
        }
    }

    /// Requests graceful shutdown: every worker broadcasts a kill to its
    /// actors at its next tick boundary and exits once its actor map is
    /// empty. Idempotent; a no-op before `start`.
    pub fn stop(&self) {
        if let Some(running) = &self.running {
            running.comms.request_stop();
        }
    }

    /// True once shutdown has been requested (programmatically or by a
    /// handled signal).
    pub fn shutdown_requested(&self) -> bool {
        signal::shutdown_requested()
            || self
                .running
                .as_ref()
                .is_some_and(|r| r.comms.stop_requested())
    }

    /// Blocks until every worker thread has terminated. Returns an error
    /// when any worker exited with a non-zero error bitmask or panicked.
    pub fn join(&mut self) -> Result<(), EngineError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        for (id, handle) in running.threads {
            match handle.join() {
                Ok(0) => {}
                Ok(bits) => self.failures.push(WorkerFailure { worker: id, bits }),
                Err(_) => self.failures.push(WorkerFailure {
                    worker: id,
                    bits: 0,
                }),
            }
        }
        drop(running.comms);

        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError {
                failures: self.failures.clone(),
            })
        }
    }

    /// True when the last `join` observed any worker failure.
    pub fn has_error(&self) -> bool {
        !self.failures.is_empty()
    }

    /// True between a successful `start` and the matching `join`.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.running.is_some() {
            self.stop();
            let _ = self.join();
        }
    }
}

#[cfg(target_os = "linux")]
fn apply_affinity(cpus: &WorkerIdSet) -> bool {
    // SAFETY: standard pthread affinity call on a zeroed cpu_set_t.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for cpu in cpus.iter() {
            libc::CPU_SET(cpu as usize, &mut set);
        }
        libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set,
        ) == 0
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_affinity(_cpus: &WorkerIdSet) -> bool {
    true
}
