//! Frame loops around a [`WasmGuest`].

use std::time::Duration;

use nux_host::{
    FixedStep, FrameScheduler, SchedulerState, Session, StopHandle, StopReason, Teardown,
};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, Instrument};

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::guest::WasmGuest;

/// How a run ended, when it ended cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Guest updates executed.
    pub frames: u64,
    /// Whether the run ended on a stop request rather than running out of frames.
    pub interrupted: bool,
    pub teardown: Teardown,
}

/// Drives one guest until it stops.
///
/// # Example
///
/// ```ignore
/// let config = RuntimeConfig::default();
/// let session = Session::new(config.host.clone(), Box::new(HeadlessBackend::new()));
/// let guest = WasmGuest::from_file("game.wasm", session, &config)?;
/// let summary = Runtime::new(config, guest).run_frames(600)?;
/// ```
pub struct Runtime {
    config: RuntimeConfig,
    scheduler: FrameScheduler<WasmGuest>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, guest: WasmGuest) -> Self {
        Self {
            config,
            scheduler: FrameScheduler::new(guest),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        self.scheduler.host().session()
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// A handle that stops the run before its next frame.
    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    /// Run `frames` guest updates on fixed-step timestamps, as fast as possible.
    pub fn run_frames(&mut self, frames: u64) -> Result<RunSummary> {
        let span = self.session().span().clone();
        let _enter = span.enter();
        info!(frames, "running headless");

        // The first tick only primes the clock.
        let mut ticks = FixedStep::per_second(self.config.frame_rate).limit(frames.saturating_add(1));
        self.scheduler.run(&mut ticks);
        self.finish()
    }

    /// Run on the wall clock at the configured frame rate until stopped,
    /// the guest faults, or Ctrl-C is pressed.
    pub async fn run_realtime(&mut self) -> Result<RunSummary> {
        let span = self.session().span().clone();
        async {
            let stop = self.stop_handle();
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupted");
                    stop.request();
                }
            });

            let period = Duration::from_secs_f64(self.config.frame_interval_ms() / 1000.0);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(frame_rate = self.config.frame_rate, "running realtime");

            let started = Instant::now();
            self.scheduler.start();
            while self.scheduler.state() != SchedulerState::Stopped {
                interval.tick().await;
                let now = started.elapsed().as_secs_f64() * 1000.0;
                self.scheduler.tick(now);
            }

            ctrl_c.abort();
            self.finish()
        }
        .instrument(span)
        .await
    }

    /// Tear the session down and turn the stop reason into a result.
    fn finish(&mut self) -> Result<RunSummary> {
        let frames = self.scheduler.frames();
        let reason = self.scheduler.take_stop_reason();
        let teardown = self.scheduler.host_mut().session_mut().teardown();
        info!(frames, ?teardown, "guest stopped");
        match reason {
            Some(StopReason::InitFailed(e)) | Some(StopReason::Fault(e)) => Err(e),
            Some(StopReason::Requested) => Ok(RunSummary {
                frames,
                interrupted: true,
                teardown,
            }),
            Some(StopReason::Exhausted) | None => Ok(RunSummary {
                frames,
                interrupted: false,
                teardown,
            }),
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
