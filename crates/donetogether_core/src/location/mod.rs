//! Location providers feeding the reminder tracker.
//!
//! # Responsibility
//! - Define the `LocationProvider` seam so platform differences (recorded
//!   tracks, host-pushed fixes) stay out of the evaluator.
//! - Report permission state using the same states platforms expose.
//!
//! # Invariants
//! - A provider that returns `None` has ended; it is never polled again.
//! - Providers never panic on platform errors; they yield `LocationError`.

use crate::model::position::Position;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// How often a blocked channel provider re-checks its stop signal.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Location permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Prompt,
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }

    /// Parses platform permission strings (`prompt|granted|denied`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "prompt" | "prompt-with-rationale" => Some(Self::Prompt),
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }
}

/// Location failures. None of them are fatal to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    PermissionDenied,
    Unavailable(String),
}

impl Display for LocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "location permission denied"),
            Self::Unavailable(message) => write!(f, "location unavailable: {message}"),
        }
    }
}

impl Error for LocationError {}

/// Cancellation flag shared between a tracker and the provider it drives.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. Returns `true` when it was not raised before.
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    /// Lowers the signal. Returns `true` when it was raised before.
    pub fn reset(&self) -> bool {
        self.stopped.swap(false, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Source of position fixes.
pub trait LocationProvider {
    fn permission(&self) -> PermissionStatus;

    /// Blocks until the next fix, an error, or the end of the stream (`None`).
    fn next_position(&mut self) -> Option<Result<Position, LocationError>>;

    /// Ends the stream; later `next_position` calls return `None`.
    fn stop(&mut self);

    /// Makes a blocked `next_position` return `None` soon after `signal` is
    /// raised. Providers that never block can ignore it.
    fn attach_stop_signal(&mut self, _signal: StopSignal) {}
}

/// Replays a recorded track in order.
#[derive(Debug, Clone)]
pub struct ReplayLocationProvider {
    track: VecDeque<Position>,
    permission: PermissionStatus,
}

impl ReplayLocationProvider {
    pub fn new(track: impl IntoIterator<Item = Position>) -> Self {
        Self {
            track: track.into_iter().collect(),
            permission: PermissionStatus::Granted,
        }
    }

    /// Simulates a platform where the user refused location access.
    pub fn denied() -> Self {
        Self {
            track: VecDeque::new(),
            permission: PermissionStatus::Denied,
        }
    }

    pub fn remaining(&self) -> usize {
        self.track.len()
    }
}

impl LocationProvider for ReplayLocationProvider {
    fn permission(&self) -> PermissionStatus {
        self.permission
    }

    fn next_position(&mut self) -> Option<Result<Position, LocationError>> {
        if self.permission == PermissionStatus::Denied {
            return None;
        }
        self.track.pop_front().map(Ok)
    }

    fn stop(&mut self) {
        self.track.clear();
    }
}

/// Sending half handed to whatever thread reads the platform location API.
#[derive(Debug, Clone)]
pub struct PositionSender {
    tx: Sender<Result<Position, LocationError>>,
}

impl PositionSender {
    /// Returns `false` once the provider side is gone.
    pub fn send(&self, position: Position) -> bool {
        self.tx.send(Ok(position)).is_ok()
    }

    pub fn fail(&self, error: LocationError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

/// Provider fed from another thread through a channel.
///
/// The stream ends once every `PositionSender` is dropped, after all buffered
/// fixes have been yielded. While an attached `StopSignal` is raised,
/// `next_position` returns `None` within one poll interval.
#[derive(Debug)]
pub struct ChannelLocationProvider {
    rx: Receiver<Result<Position, LocationError>>,
    permission: PermissionStatus,
    stopped: bool,
    signal: Option<StopSignal>,
}

impl ChannelLocationProvider {
    pub fn new(permission: PermissionStatus) -> (Self, PositionSender) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                rx,
                permission,
                stopped: false,
                signal: None,
            },
            PositionSender { tx },
        )
    }
}

impl LocationProvider for ChannelLocationProvider {
    fn permission(&self) -> PermissionStatus {
        self.permission
    }

    fn next_position(&mut self) -> Option<Result<Position, LocationError>> {
        if self.stopped {
            return None;
        }
        let received = match self.signal.as_ref() {
            Some(signal) => loop {
                if signal.is_stopped() {
                    return None;
                }
                match self.rx.recv_timeout(STOP_POLL_INTERVAL) {
                    Ok(result) => break result,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return None,
                }
            },
            None => self.rx.recv().ok()?,
        };
        match &received {
            Err(LocationError::PermissionDenied) => self.permission = PermissionStatus::Denied,
            Ok(_) => self.permission = PermissionStatus::Granted,
            Err(_) => {}
        }
        Some(received)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn attach_stop_signal(&mut self, signal: StopSignal) {
        self.signal = Some(signal);
    }
}
