//! Barrier-synchronised worker pool.
//!
//! The calling thread runs as worker 0; workers `1..T` are spawned once per
//! run inside a thread scope. Every step each worker goes through:
//!
//! ```text
//! zero own accelerations      | barrier
//! forces for own row band     | barrier
//! integrate + migrate own     | barrier
//! worker 0: apply deferred moves, verify, save | barrier
//! ```

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Barrier, Condvar, Mutex, RwLock, RwLockReadGuard};
use std::thread;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::particle::{Acceleration, Particle, ParticleLookup};
use crate::physics::grid::NeighborScratch;
use crate::physics::migration::{advance_tracked, MigrationStrategy, MoveList};
use crate::physics::{PhysicsSettings, SpatialGrid};
use crate::scheduler::{check_options, Partition, RunOptions, RunReport, Scheduler, Simulation};
use crate::sync;
use crate::trajectory::{Recorder, SnapshotSink};

#[derive(Debug, Clone, Copy)]
pub struct ParallelScheduler {
    threads: usize,
    migration: MigrationStrategy,
}

impl ParallelScheduler {
    pub fn new(threads: usize, migration: MigrationStrategy) -> Result<Self> {
        if threads == 0 {
            return Err(Error::InvalidParam("thread count must be at least 1".into()));
        }
        let cpus = num_cpus::get();
        if threads > cpus {
            warn!("{threads} worker threads requested on {cpus} logical CPUs");
        }
        Ok(Self { threads, migration })
    }
}

impl Scheduler for ParallelScheduler {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn threads(&self) -> usize {
        self.threads
    }

    fn run(
        &self,
        sim: &mut Simulation,
        options: &RunOptions,
        sink: Option<&mut dyn SnapshotSink>,
    ) -> Result<RunReport> {
        check_options(options)?;
        let n = sim.particles.len();
        let partition = Partition::new(n, sim.grid.dim(), self.threads);
        info!(
            "Running {} steps on {} threads with {:?} migration",
            options.steps, self.threads, self.migration
        );

        let store = ChunkedStore::split(std::mem::take(&mut sim.particles), &partition);
        let shared = Shared {
            grid: &sim.grid,
            physics: &sim.physics,
            options,
            migration: self.migration,
            partition: &partition,
            store: &store,
            accelerations: AccelerationTable::new(n),
            move_lists: (0..self.threads).map(|_| Mutex::new(MoveList::default())).collect(),
            barrier: Barrier::new(self.threads),
            gate: StartGate::default(),
            fault: FaultSlot::default(),
            migrations: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        };
        let mut recorder = Recorder::new(sink, options.save_frequency);

        let outcome = run_pool(&shared, self.threads, &mut recorder);
        recorder.finish();

        let completed = shared.completed.load(Ordering::Relaxed);
        let migrations = shared.migrations.load(Ordering::Relaxed);
        let fault = shared.fault.take();
        drop(shared);
        sim.particles = store.into_particles();
        sim.step += completed;

        outcome?;
        if let Some(e) = fault {
            return Err(e);
        }
        Ok(RunReport {
            steps: completed,
            snapshots: recorder.saved(),
            migrations,
            threads: self.threads,
        })
    }
}

/// Spawns workers `1..threads`, runs worker 0 on the calling thread and
/// joins the rest.
fn run_pool(shared: &Shared<'_>, threads: usize, recorder: &mut Recorder<'_>) -> Result<()> {
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads.saturating_sub(1));
        let mut spawn_failure = None;
        for t in 1..threads {
            let spawned = thread::Builder::new()
                .name(format!("worker-{t}"))
                .spawn_scoped(scope, move || shared.worker(t, None));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    spawn_failure = Some(Error::threading("thread spawn", e.to_string()));
                    break;
                }
            }
        }

        if let Some(failure) = spawn_failure {
            // Spawned workers are parked on the gate, not the barrier.
            shared.gate.open(false);
            for handle in handles {
                let _ = handle.join();
            }
            return Err(failure);
        }

        shared.gate.open(true);
        debug!("{threads} workers started");
        shared.worker(0, Some(recorder));

        for (k, handle) in handles.into_iter().enumerate() {
            handle
                .join()
                .map_err(|_| Error::threading("thread join", format!("worker {} panicked", k + 1)))?;
        }
        Ok(())
    })
}

/// State every worker borrows for the length of one run.
struct Shared<'a> {
    grid: &'a SpatialGrid,
    physics: &'a PhysicsSettings,
    options: &'a RunOptions,
    migration: MigrationStrategy,
    partition: &'a Partition,
    store: &'a ChunkedStore,
    accelerations: AccelerationTable,
    move_lists: Vec<Mutex<MoveList>>,
    barrier: Barrier,
    gate: StartGate,
    fault: FaultSlot,
    migrations: AtomicUsize,
    completed: AtomicUsize,
}

impl Shared<'_> {
    fn worker(&self, t: usize, mut recorder: Option<&mut Recorder<'_>>) {
        if !self.gate.wait() {
            return;
        }
        let owned = self.partition.particles(t);
        let band = self.partition.rows(t);
        let mut scratch = NeighborScratch::default();

        for step in 0..self.options.steps {
            if !self.fault.is_raised() {
                self.zero_accelerations(t, owned.clone());
            }
            self.barrier.wait();

            if !self.fault.is_raised() {
                self.compute_forces(band.clone(), &mut scratch);
            }
            self.barrier.wait();

            if !self.fault.is_raised() {
                if let Err(e) = self.integrate_and_migrate(t, owned.clone()) {
                    self.fault.raise(e);
                }
            }
            self.barrier.wait();

            if t == 0 && !self.fault.is_raised() {
                if let Err(e) = self.finish_step(step, recorder.as_deref_mut()) {
                    self.fault.raise(e);
                }
            }
            self.barrier.wait();

            // Every worker reads the same flag after the same barrier.
            if self.fault.is_raised() {
                break;
            }
        }
    }

    fn zero_accelerations(&self, t: usize, owned: Range<usize>) {
        for particle in sync::write(self.store.chunk(t)).iter_mut() {
            particle.acceleration = Acceleration::zeros();
        }
        for i in owned {
            self.accelerations.store(i, Acceleration::zeros());
        }
    }

    fn compute_forces(&self, band: Range<usize>, scratch: &mut NeighborScratch) {
        let view = self.store.view(self.partition);
        for coord in self.grid.coords_in_rows(band) {
            self.grid
                .cell_accelerations(coord, &view, self.physics, scratch, |i, a| {
                    self.accelerations.store(i, a)
                });
        }
    }

    fn integrate_and_migrate(&self, t: usize, owned: Range<usize>) -> Result<()> {
        let mut chunk = sync::write(self.store.chunk(t));
        let mut deferred = sync::lock(&self.move_lists[t]);
        let mut moved = 0;

        for (i, particle) in owned.zip(chunk.iter_mut()) {
            particle.acceleration = self.accelerations.load(i);
            let (from, to) = advance_tracked(self.grid, i, particle, self.physics.dt)?;
            match self.migration {
                MigrationStrategy::Locked => {
                    if from != to {
                        self.grid.move_if_needed(i, from, to)?;
                        moved += 1;
                    }
                }
                MigrationStrategy::Deferred => deferred.record(i, from, to),
            }
        }
        self.migrations.fetch_add(moved, Ordering::Relaxed);
        Ok(())
    }

    /// Worker 0's serial tail of a step.
    fn finish_step(&self, step: usize, recorder: Option<&mut Recorder<'_>>) -> Result<()> {
        if self.migration == MigrationStrategy::Deferred {
            let mut moved = 0;
            for list in &self.move_lists {
                moved += sync::lock(list).apply(self.grid)?;
            }
            self.migrations.fetch_add(moved, Ordering::Relaxed);
        }
        let view = self.store.view(self.partition);
        if self.options.verify {
            self.grid.verify(&view, self.store.len())?;
        }
        // A step counts once it has passed verification.
        self.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(recorder) = recorder {
            if recorder.is_due(step) {
                debug!("Saving snapshot at step {step}");
                recorder.record(
                    self.grid.side(),
                    (0..self.store.len()).map(|i| view.particle(i).position),
                );
            }
        }
        Ok(())
    }
}

/// The particle store cut into one chunk per index range, each behind its
/// own lock. Only the owning worker ever write-locks a chunk.
struct ChunkedStore {
    chunks: Vec<RwLock<Vec<Particle>>>,
    len: usize,
}

impl ChunkedStore {
    fn split(mut particles: Vec<Particle>, partition: &Partition) -> Self {
        let len = particles.len();
        let mut chunks = Vec::with_capacity(partition.threads());
        for t in (0..partition.threads()).rev() {
            let range = partition.particles(t);
            chunks.push(RwLock::new(particles.split_off(range.start)));
        }
        chunks.reverse();
        Self { chunks, len }
    }

    fn into_particles(self) -> Vec<Particle> {
        let mut particles = Vec::with_capacity(self.len);
        for chunk in self.chunks {
            particles.extend(chunk.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner));
        }
        particles
    }

    fn len(&self) -> usize {
        self.len
    }

    fn chunk(&self, t: usize) -> &RwLock<Vec<Particle>> {
        &self.chunks[t]
    }

    fn view<'a>(&'a self, partition: &'a Partition) -> StoreView<'a> {
        StoreView {
            guards: self.chunks.iter().map(sync::read).collect(),
            partition,
        }
    }
}

/// Read access to the whole store, by particle index.
struct StoreView<'a> {
    guards: Vec<RwLockReadGuard<'a, Vec<Particle>>>,
    partition: &'a Partition,
}

impl ParticleLookup for StoreView<'_> {
    fn particle(&self, index: usize) -> &Particle {
        let (chunk, offset) = self.partition.locate(index);
        &self.guards[chunk][offset]
    }
}

/// Per-particle acceleration slots shared across the force/integrate split.
///
/// Slot `i` is zeroed and read by the owner of index `i` and written once by
/// the owner of the row band holding `i`; the barriers between those phases
/// order the accesses, so relaxed atomics suffice.
struct AccelerationTable {
    slots: Vec<[AtomicU64; 2]>,
}

impl AccelerationTable {
    fn new(n: usize) -> Self {
        Self {
            slots: (0..n)
                .map(|_| [AtomicU64::new(0), AtomicU64::new(0)])
                .collect(),
        }
    }

    fn store(&self, i: usize, a: Acceleration) {
        self.slots[i][0].store(a.x.to_bits(), Ordering::Relaxed);
        self.slots[i][1].store(a.y.to_bits(), Ordering::Relaxed);
    }

    fn load(&self, i: usize) -> Acceleration {
        Acceleration::new(
            f64::from_bits(self.slots[i][0].load(Ordering::Relaxed)),
            f64::from_bits(self.slots[i][1].load(Ordering::Relaxed)),
        )
    }
}

/// Holds spawned workers until the whole pool exists, so a failed spawn can
/// send them home instead of stranding them at the first barrier.
#[derive(Default)]
struct StartGate {
    state: Mutex<Option<bool>>,
    opened: Condvar,
}

impl StartGate {
    fn open(&self, proceed: bool) {
        *sync::lock(&self.state) = Some(proceed);
        self.opened.notify_all();
    }

    fn wait(&self) -> bool {
        let mut state = sync::lock(&self.state);
        loop {
            if let Some(proceed) = *state {
                return proceed;
            }
            state = self
                .opened
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}

/// First fault raised by any worker during a run.
#[derive(Default)]
struct FaultSlot {
    raised: AtomicBool,
    first: Mutex<Option<Error>>,
}

impl FaultSlot {
    fn raise(&self, e: Error) {
        let mut first = sync::lock(&self.first);
        if first.is_none() {
            warn!("Worker fault, stopping at end of step: {e}");
            *first = Some(e);
        }
        self.raised.store(true, Ordering::Release);
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    fn take(&self) -> Option<Error> {
        sync::lock(&self.first).take()
    }
}
