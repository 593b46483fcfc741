use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::{JoinHandle, JoinSet};

use crate::config::WorkloadConfig;
use crate::executor::ScenarioEnv;
use crate::gate::DurationGate;
use crate::recorder::EngineMetrics;
use crate::scenario::Scenario;
use crate::schedule::RampSchedule;
use crate::vu::{StartSignal, StopSignal, VuContext, VuState, run_vu};

const TICK: Duration = Duration::from_millis(100);

/// Fleet-level phase, observable through the scheduler handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    RampingUp = 0,
    Steady = 1,
    RampingDown = 2,
    Finished = 3,
}

impl SchedulerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SchedulerState::Steady,
            2 => SchedulerState::RampingDown,
            3 => SchedulerState::Finished,
            _ => SchedulerState::RampingUp,
        }
    }
}

struct VuSlot {
    stop: Arc<StopSignal>,
    state: Arc<AtomicU8>,
}

/// Handle over a running fleet of virtual users. The supervisor task spawns
/// users to match the configured shape and tears them down when the duration
/// gate expires; `stop` ends the run early.
pub struct VuScheduler {
    stop: Arc<StopSignal>,
    active: Arc<AtomicU64>,
    slots: Arc<Mutex<Vec<VuSlot>>>,
    state: Arc<AtomicU8>,
}

impl VuScheduler {
    /// Spawn the supervisor. The returned join handle resolves once every
    /// virtual user has finished.
    pub(crate) fn start<S: Scenario>(
        scenario: Arc<S>,
        setup: Arc<S::Setup>,
        env: ScenarioEnv,
        engine: EngineMetrics,
        config: &WorkloadConfig,
    ) -> (Self, JoinHandle<()>) {
        let stop = Arc::new(StopSignal::default());
        let active = Arc::new(AtomicU64::new(0));
        let slots: Arc<Mutex<Vec<VuSlot>>> = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(AtomicU8::new(SchedulerState::RampingUp as u8));

        let schedule = if config.stages.is_empty() {
            RampSchedule::new(config.vus, Vec::new())
        } else {
            RampSchedule::new(0, config.stages.clone())
        };
        let total = config.total_duration();
        let think_time = config.think_time;

        let supervisor = tokio::spawn(supervise(Fleet {
            scenario,
            setup,
            env,
            engine,
            schedule,
            total,
            think_time,
            stop: stop.clone(),
            active: active.clone(),
            slots: slots.clone(),
            state: state.clone(),
        }));

        (
            Self {
                stop,
                active,
                slots,
                state,
            },
            supervisor,
        )
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Raise the stop flag for every current and future virtual user.
    pub fn stop(&self) {
        self.stop.raise();
        if let Ok(slots) = self.slots.lock() {
            for slot in slots.iter() {
                slot.stop.raise();
            }
        }
    }

    /// Users currently inside their iteration loop.
    #[must_use]
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    /// Lifecycle state of every user spawned so far, in spawn order.
    #[must_use]
    pub fn vu_states(&self) -> Vec<VuState> {
        match self.slots.lock() {
            Ok(slots) => slots
                .iter()
                .map(|s| VuState::from_u8(s.state.load(Ordering::Acquire)))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

struct Fleet<S: Scenario> {
    scenario: Arc<S>,
    setup: Arc<S::Setup>,
    env: ScenarioEnv,
    engine: EngineMetrics,
    schedule: RampSchedule,
    total: Duration,
    think_time: Duration,
    stop: Arc<StopSignal>,
    active: Arc<AtomicU64>,
    slots: Arc<Mutex<Vec<VuSlot>>>,
    state: Arc<AtomicU8>,
}

/// Commission users to track the schedule, decommission on ramp-down, and
/// wait the fleet out. Ramp-down stops the most recently spawned users first.
async fn supervise<S: Scenario>(fleet: Fleet<S>) {
    let gate = Arc::new(DurationGate::default());
    let start = Arc::new(StartSignal::default());
    let mut tasks = JoinSet::new();
    // Spawn order of commissioned, not yet stopped users.
    let mut commissioned: Vec<Arc<StopSignal>> = Vec::new();
    let mut spawned: u64 = 0;

    let commission = |tasks: &mut JoinSet<()>,
                      commissioned: &mut Vec<Arc<StopSignal>>,
                      spawned: &mut u64,
                      gate: &Arc<DurationGate>,
                      start: &Arc<StartSignal>| {
        let vu_stop = Arc::new(StopSignal::default());
        let state = Arc::new(AtomicU8::new(VuState::Spawning as u8));
        if let Ok(mut slots) = fleet.slots.lock() {
            slots.push(VuSlot {
                stop: vu_stop.clone(),
                state: state.clone(),
            });
        }
        *spawned += 1;
        tasks.spawn(run_vu(VuContext {
            // 1-based identity; the seed space treats user 0 as reserved.
            vu_id: *spawned,
            scenario: fleet.scenario.clone(),
            setup: fleet.setup.clone(),
            env: fleet.env.clone(),
            engine: fleet.engine.clone(),
            gate: gate.clone(),
            start: start.clone(),
            stop: vu_stop.clone(),
            think_time: fleet.think_time,
            active: fleet.active.clone(),
            state,
        }));
        commissioned.push(vu_stop);
    };

    // Bring up the initial batch before the clock starts so flat shapes
    // begin with every user ready.
    let initial = fleet.schedule.target_at(Duration::ZERO);
    for _ in 0..initial {
        commission(&mut tasks, &mut commissioned, &mut spawned, &gate, &start);
    }

    let started_at = Instant::now();
    gate.arm(fleet.total);
    start.fire();
    fleet
        .state
        .store(SchedulerState::Steady as u8, Ordering::Release);

    loop {
        if fleet.stop.is_raised() {
            break;
        }
        let elapsed = started_at.elapsed();
        if elapsed >= fleet.total {
            break;
        }

        let target = usize::try_from(fleet.schedule.target_at(elapsed)).unwrap_or(usize::MAX);
        let phase = if commissioned.len() < target {
            SchedulerState::RampingUp
        } else if commissioned.len() > target {
            SchedulerState::RampingDown
        } else {
            SchedulerState::Steady
        };
        fleet.state.store(phase as u8, Ordering::Release);

        while commissioned.len() < target {
            commission(&mut tasks, &mut commissioned, &mut spawned, &gate, &start);
        }
        while commissioned.len() > target {
            if let Some(vu_stop) = commissioned.pop() {
                vu_stop.raise();
            }
        }

        tokio::select! {
            () = fleet.stop.cancelled() => break,
            () = tokio::time::sleep(TICK) => {}
        }
    }

    fleet
        .state
        .store(SchedulerState::RampingDown as u8, Ordering::Release);

    // Wind down promptly instead of letting stragglers sleep out their
    // think time against an expired gate.
    for vu_stop in commissioned.drain(..) {
        vu_stop.raise();
    }

    while let Some(res) = tasks.join_next().await {
        if let Err(err) = res {
            if err.is_panic() {
                fleet.engine.record_fault();
            }
        }
    }

    fleet
        .state
        .store(SchedulerState::Finished as u8, Ordering::Release);
}
