use crate::cancel::CancellationToken;
use crate::config::{Config, RunMode};
use crate::error::ProbeError;
use crate::monitor::{TelemetrySampler, TelemetrySource};
use crate::registers::RegisterReader;
use crate::render::Renderer;
use crossterm::event::{self, Event};
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::debug;

/// Why a pause between cycles ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Keypress,
    Cancelled,
}

/// The single blocking wait between two cycles.
pub trait Pause {
    fn pause(&mut self, interval: Duration, token: &CancellationToken) -> io::Result<Wake>;
}

// Longest stretch spent in one input poll before the token is checked again
const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(50);

/// Source of operator keypresses.
pub trait KeyInput {
    /// Wait up to `timeout`; true if a key was pressed.
    fn wait_key(&mut self, timeout: Duration) -> io::Result<bool>;
}

pub struct TerminalKeys;

impl KeyInput for TerminalKeys {
    fn wait_key(&mut self, timeout: Duration) -> io::Result<bool> {
        if !event::poll(timeout)? {
            return Ok(false);
        }
        // resize, focus and mouse events are not keypresses
        Ok(matches!(event::read()?, Event::Key(_)))
    }
}

/// Waits for a key on the terminal, or for cancellation, whichever comes first.
pub struct KeypressPause<K = TerminalKeys> {
    keys: K,
}

impl<K: KeyInput> KeypressPause<K> {
    pub fn new(keys: K) -> Self {
        Self { keys }
    }
}

impl<K: KeyInput> Pause for KeypressPause<K> {
    fn pause(&mut self, interval: Duration, token: &CancellationToken) -> io::Result<Wake> {
        let deadline = Instant::now() + interval;
        loop {
            if token.is_cancelled() {
                return Ok(Wake::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Wake::Elapsed);
            }
            if self.keys.wait_key(remaining.min(CANCEL_CHECK_SLICE))? {
                return Ok(Wake::Keypress);
            }
        }
    }
}

/// Used when stdin is not a terminal: sleeps on the token itself.
pub struct CancelPause;

impl Pause for CancelPause {
    fn pause(&mut self, interval: Duration, token: &CancellationToken) -> io::Result<Wake> {
        Ok(if token.wait_timeout(interval) {
            Wake::Cancelled
        } else {
            Wake::Elapsed
        })
    }
}

enum LoopState {
    Running,
    Stopping(Result<(), ProbeError>),
    Stopped,
}

fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Drives sampling, rendering and the wait in between, all on one thread.
pub struct SampleLoop<S, R, W> {
    sampler: TelemetrySampler<S, R>,
    renderer: Renderer,
    out: W,
    pause: Box<dyn Pause>,
    token: CancellationToken,
    mode: RunMode,
    interval: Duration,
    clock: fn() -> i64,
    cycles: u64,
}

impl<S, R, W> SampleLoop<S, R, W>
where
    S: TelemetrySource,
    R: RegisterReader,
    W: Write,
{
    pub fn new(
        sampler: TelemetrySampler<S, R>,
        renderer: Renderer,
        out: W,
        pause: Box<dyn Pause>,
        token: CancellationToken,
        config: &Config,
    ) -> Self {
        Self {
            sampler,
            renderer,
            out,
            pause,
            token,
            mode: config.mode,
            interval: config.refresh_interval,
            clock: unix_timestamp,
            cycles: 0,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.out
    }

    /// Run until cancelled, a key is pressed, one-shot mode is done or a
    /// cycle fails. Returns the number of rendered cycles.
    pub fn run(&mut self) -> Result<u64, ProbeError> {
        let mut state = LoopState::Running;
        let mut outcome = Ok(());
        loop {
            state = match state {
                LoopState::Running => self.step(),
                LoopState::Stopping(result) => {
                    let finished = self.renderer.finish(&mut self.out);
                    outcome = result.and(finished.map_err(ProbeError::from));
                    LoopState::Stopped
                }
                LoopState::Stopped => break,
            };
        }
        debug!("sample loop stopped after {} cycle(s)", self.cycles);
        outcome.map(|()| self.cycles)
    }

    fn step(&mut self) -> LoopState {
        if self.token.is_cancelled() {
            return LoopState::Stopping(Ok(()));
        }

        let cycle = match self.sampler.sample() {
            Ok(cycle) => cycle,
            Err(err) => return LoopState::Stopping(Err(err)),
        };
        if let Err(err) = self
            .renderer
            .render(&cycle, (self.clock)(), &mut self.out)
        {
            return LoopState::Stopping(Err(err.into()));
        }
        self.cycles += 1;

        if self.mode == RunMode::Once {
            return LoopState::Stopping(Ok(()));
        }

        match self.pause.pause(self.interval, &self.token) {
            Ok(Wake::Elapsed) => LoopState::Running,
            Ok(wake) => {
                debug!("stopping: {wake:?}");
                LoopState::Stopping(Ok(()))
            }
            Err(err) => LoopState::Stopping(Err(err.into())),
        }
    }
}
