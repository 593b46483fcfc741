use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::executor::ScenarioEnv;
use crate::gate::DurationGate;
use crate::recorder::EngineMetrics;
use crate::scenario::{Scenario, iteration_rng};

/// One-shot latch that releases every virtual user at once. Users spawned
/// after the latch fires (ramp-up) pass through immediately.
#[derive(Debug, Default)]
pub(crate) struct StartSignal {
    fired: AtomicBool,
    notify: Notify,
}

impl StartSignal {
    pub(crate) fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.fired.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

/// Cooperative stop flag. Users observe it between iterations and while
/// sleeping through think time; in-flight requests are left to finish.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    raised: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub(crate) fn raise(&self) {
        self.raised.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

/// Per-user lifecycle, observable through the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VuState {
    /// Spawned, waiting on the start latch.
    Spawning = 0,
    Running = 1,
    /// Stop or gate expiry observed; finishing the in-flight iteration.
    Draining = 2,
    Stopped = 3,
}

impl VuState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => VuState::Running,
            2 => VuState::Draining,
            3 => VuState::Stopped,
            _ => VuState::Spawning,
        }
    }
}

/// Scope guard tying the `vus` gauge and the scheduler's live count to the
/// user's actual lifetime; `vus_max` keeps the peak.
struct ActiveVuGuard {
    vus: stampede_metrics::MetricHandle,
    active: Arc<AtomicU64>,
}

impl ActiveVuGuard {
    fn enter(engine: &EngineMetrics, active: Arc<AtomicU64>) -> Self {
        let now_active = active.fetch_add(1, Ordering::AcqRel) + 1;
        engine.vus.increment_gauge(1);
        engine
            .vus_max
            .raise_gauge(i64::try_from(now_active).unwrap_or(i64::MAX));
        Self {
            vus: engine.vus.clone(),
            active,
        }
    }
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.vus.decrement_gauge(1);
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct VuContext<S: Scenario> {
    pub(crate) vu_id: u64,
    pub(crate) scenario: Arc<S>,
    pub(crate) setup: Arc<S::Setup>,
    pub(crate) env: ScenarioEnv,
    pub(crate) engine: EngineMetrics,
    pub(crate) gate: Arc<DurationGate>,
    pub(crate) start: Arc<StartSignal>,
    pub(crate) stop: Arc<StopSignal>,
    pub(crate) think_time: Duration,
    pub(crate) active: Arc<AtomicU64>,
    pub(crate) state: Arc<AtomicU8>,
}

/// The virtual-user loop: wait for the start latch, then iterate until the
/// duration gate expires or a stop is raised.
///
/// Each iteration runs in its own task so a panicking scenario takes down
/// only that iteration. The panic is absorbed into the `vu_faults` counter
/// and the user carries on with the next iteration; nothing of the
/// iteration's state survives anyway since every iteration re-seeds its RNG.
pub(crate) async fn run_vu<S: Scenario>(ctx: VuContext<S>) {
    ctx.start.wait().await;

    if ctx.stop.is_raised() || ctx.gate.expired() {
        set_state(&ctx, VuState::Stopped);
        return;
    }

    let _guard = ActiveVuGuard::enter(&ctx.engine, ctx.active.clone());
    set_state(&ctx, VuState::Running);

    let mut iteration: u64 = 0;
    loop {
        if ctx.stop.is_raised() || ctx.gate.expired() {
            break;
        }

        let started = Instant::now();
        let scenario = ctx.scenario.clone();
        let setup = ctx.setup.clone();
        let env = ctx.env.clone();
        let vu_id = ctx.vu_id;
        let n = iteration;

        let task = tokio::spawn(async move {
            let mut rng = iteration_rng(vu_id, n);
            scenario.iterate(&env, &setup, &mut rng).await
        });

        match task.await {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    ctx.engine.record_outcome(outcome);
                }
                ctx.engine.record_iteration(started.elapsed());
            }
            Err(err) if err.is_panic() => {
                ctx.engine.record_fault();
            }
            // Runtime shutdown; nothing left to record.
            Err(_) => break,
        }

        iteration += 1;

        if !ctx.think_time.is_zero() {
            tokio::select! {
                () = ctx.stop.cancelled() => break,
                () = tokio::time::sleep(ctx.think_time) => {}
            }
        }
    }

    // Signals are only observed between iterations, so the drain window
    // is empty by construction: nothing is in flight when we get here.
    set_state(&ctx, VuState::Draining);
    set_state(&ctx, VuState::Stopped);
}

fn set_state<S: Scenario>(ctx: &VuContext<S>, state: VuState) {
    ctx.state.store(state as u8, Ordering::Release);
}
