//! The frame scheduler.
//!
//! A small state machine that drives the guest: `init` once, then one
//! `update` per tick. Where ticks come from is up to the caller; headless
//! runs feed a [`TickSource`], the realtime loop calls [`FrameScheduler::tick`]
//! from a timer.
//!
//! ```text
//! Uninitialized --start ok--> Ready --first tick--> Running
//!       |                       |                      |
//!       +--start failed---------+----stop / fault------+--> Stopped
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, debug_span, error, info};

/// Timing for one guest update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Timestamp of this tick, in milliseconds.
    pub now: f64,
    /// Milliseconds since the previous tick, never negative.
    pub dt: f64,
    /// Number of updates so far, counting this one.
    pub frame: u64,
}

/// What the scheduler drives.
pub trait FrameHost {
    type Error: fmt::Display;

    /// Run the guest's init entry point.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Poll input and hand it to the guest. Called before every update.
    fn refresh_input(&mut self, time: &FrameTime);

    /// Run the guest's per-frame entry point.
    fn update(&mut self, time: &FrameTime) -> Result<(), Self::Error>;
}

/// Supplies tick timestamps in milliseconds. `None` ends the run.
pub trait TickSource {
    fn next_tick(&mut self) -> Option<f64>;
}

impl<I: Iterator<Item = f64>> TickSource for I {
    fn next_tick(&mut self) -> Option<f64> {
        self.next()
    }
}

/// Evenly spaced timestamps starting at zero.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: f64,
    next: u64,
    limit: Option<u64>,
}

impl FixedStep {
    pub fn new(step_ms: f64) -> Self {
        Self {
            step: step_ms,
            next: 0,
            limit: None,
        }
    }

    /// Ticks spaced for `frame_rate` frames per second.
    pub fn per_second(frame_rate: u32) -> Self {
        Self::new(1000.0 / f64::from(frame_rate.max(1)))
    }

    /// Stop after `ticks` timestamps.
    pub fn limit(mut self, ticks: u64) -> Self {
        self.limit = Some(ticks);
        self
    }
}

impl Iterator for FixedStep {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.limit.is_some_and(|limit| self.next >= limit) {
            return None;
        }
        let now = self.next as f64 * self.step;
        self.next += 1;
        Some(now)
    }
}

/// Requests a stop from outside the frame loop. Clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Uninitialized,
    Ready,
    Running,
    Stopped,
}

/// Why the scheduler stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason<E> {
    /// `stop()` or a [`StopHandle`] asked for it.
    Requested,
    /// The tick source ran dry.
    Exhausted,
    /// The guest's init entry point failed.
    InitFailed(E),
    /// The guest faulted during an update.
    Fault(E),
}

impl<E> StopReason<E> {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::InitFailed(_) | StopReason::Fault(_))
    }
}

impl<E: fmt::Display> fmt::Display for StopReason<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => f.write_str("stop requested"),
            StopReason::Exhausted => f.write_str("no more ticks"),
            StopReason::InitFailed(e) => write!(f, "init failed: {}", e),
            StopReason::Fault(e) => write!(f, "guest fault: {}", e),
        }
    }
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// `start` has not run yet; nothing happened.
    Idle,
    /// First tick: the clock was primed, no update ran.
    Primed,
    Updated { dt: f64 },
    Stopped,
}

pub struct FrameScheduler<H: FrameHost> {
    host: H,
    state: SchedulerState,
    previous_time: f64,
    frames: u64,
    stop: StopHandle,
    stop_reason: Option<StopReason<H::Error>>,
}

impl<H: FrameHost> FrameScheduler<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            state: SchedulerState::Uninitialized,
            previous_time: 0.0,
            frames: 0,
            stop: StopHandle::default(),
            stop_reason: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of guest updates run so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn stop_reason(&self) -> Option<&StopReason<H::Error>> {
        self.stop_reason.as_ref()
    }

    /// Move the stop reason out. The scheduler stays stopped.
    pub fn take_stop_reason(&mut self) -> Option<StopReason<H::Error>> {
        self.stop_reason.take()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Ask the scheduler to stop before its next tick.
    pub fn stop(&self) {
        self.stop.request();
    }

    /// Run the guest's init entry point. Only the first call does anything.
    pub fn start(&mut self) -> SchedulerState {
        if self.state != SchedulerState::Uninitialized {
            return self.state;
        }
        match self.host.init() {
            Ok(()) => {
                debug!("guest initialized");
                self.state = SchedulerState::Ready;
            }
            Err(e) => {
                error!(error = %e, "guest init failed");
                self.finish(StopReason::InitFailed(e));
            }
        }
        self.state
    }

    /// Advance one tick at time `now` (milliseconds).
    pub fn tick(&mut self, now: f64) -> Tick {
        if self.state == SchedulerState::Stopped {
            return Tick::Stopped;
        }
        if self.stop.is_requested() {
            info!(frames = self.frames, "stop requested");
            self.finish(StopReason::Requested);
            return Tick::Stopped;
        }

        match self.state {
            SchedulerState::Uninitialized => Tick::Idle,
            SchedulerState::Ready => {
                self.previous_time = now;
                self.state = SchedulerState::Running;
                Tick::Primed
            }
            SchedulerState::Running => {
                let dt = (now - self.previous_time).max(0.0);
                self.previous_time = now;
                self.frames += 1;
                let time = FrameTime {
                    now,
                    dt,
                    frame: self.frames,
                };

                let _span = debug_span!("tick", frame = time.frame).entered();
                self.host.refresh_input(&time);
                match self.host.update(&time) {
                    Ok(()) => Tick::Updated { dt },
                    Err(e) => {
                        error!(error = %e, frame = time.frame, "guest update failed");
                        self.finish(StopReason::Fault(e));
                        Tick::Stopped
                    }
                }
            }
            SchedulerState::Stopped => Tick::Stopped,
        }
    }

    /// Start if needed, then tick until stopped or `source` runs out.
    pub fn run(&mut self, source: &mut dyn TickSource) -> Option<&StopReason<H::Error>> {
        self.start();
        while self.state != SchedulerState::Stopped {
            match source.next_tick() {
                Some(now) => {
                    self.tick(now);
                }
                None => self.finish(StopReason::Exhausted),
            }
        }
        self.stop_reason()
    }

    fn finish(&mut self, reason: StopReason<H::Error>) {
        self.state = SchedulerState::Stopped;
        self.stop_reason.get_or_insert(reason);
    }
}

impl<H: FrameHost> fmt::Debug for FrameScheduler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("state", &self.state)
            .field("previous_time", &self.previous_time)
            .field("frames", &self.frames)
            .finish()
    }
}
