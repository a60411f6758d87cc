//! Connect management (§4.5 "Connect management"): drives the handshake
//! that establishes the underlying UDP-stream connection this layer rides
//! on top of, independent of the send/release queues.

use crate::err::{AsdError, AsdErrorKind};
use crate::frame::{ConnectHandle, ControlFrame, RST};
use crate::params::AsdParams;

/// Caller-supplied hook for attempting the underlying stream connect.
/// Returns `Ok(true)` once the connect has completed, `Ok(false)` while
/// still pending, and `Err` for a hard failure that should propagate.
pub trait ConnectAttempt {
    fn try_connect(&mut self, connect_handle: ConnectHandle) -> Result<bool, AsdError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Disconnected,
    Connecting { started_at_ms: u64 },
    Connected,
}

/// Tracks one stream's connect state across ticks (§4.5 `tick()` entry
/// point). `remote` is `None` when this side is not configured to
/// initiate a connect (e.g. it is the listening side).
pub struct ConnectManager {
    connect_handle: ConnectHandle,
    remote_configured: bool,
    state: State,
}

impl ConnectManager {
    pub fn new(connect_handle: ConnectHandle, remote_configured: bool) -> Self {
        return Self {
            connect_handle,
            remote_configured,
            state: State::Disconnected,
        };
    }

    pub fn connect_handle(&self) -> ConnectHandle {
        self.connect_handle
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected)
    }

    /// Marks the stream connected out of band (e.g. the passive/listening
    /// side, which never calls [`ConnectManager::tick`] to initiate one).
    pub fn mark_connected(&mut self) {
        self.state = State::Connected;
    }

    /// Runs one connect-management tick: if disconnected and a remote is
    /// configured, attempts a connect; if an attempt has been outstanding
    /// longer than `connect_timeout_ms`, clears it for a retry next tick.
    /// On the tick a connect newly completes, emits an `RST` control
    /// frame via `on_rst` to discard any stale release queues on the peer
    /// (§4.5).
    pub fn tick(&mut self, now_ms: u64, params: &AsdParams, attempt: &mut impl ConnectAttempt, mut on_rst: impl FnMut(ControlFrame)) -> Result<(), AsdError> {
        if !self.remote_configured {
            return Ok(());
        }

        match self.state {
            State::Connected => {}
            State::Disconnected => {
                self.state = State::Connecting { started_at_ms: now_ms };
                self.try_advance(now_ms, params, attempt, &mut on_rst)?;
            }
            State::Connecting { started_at_ms } => {
                if now_ms.saturating_sub(started_at_ms) > params.connect_timeout_ms {
                    self.state = State::Disconnected;
                    return Ok(());
                }
                self.try_advance(now_ms, params, attempt, &mut on_rst)?;
            }
        }
        return Ok(());
    }

    fn try_advance(&mut self, now_ms: u64, _params: &AsdParams, attempt: &mut impl ConnectAttempt, on_rst: &mut impl FnMut(ControlFrame)) -> Result<(), AsdError> {
        match attempt.try_connect(self.connect_handle) {
            Ok(true) => {
                self.state = State::Connected;
                on_rst(ControlFrame::new(RST, 0));
            }
            Ok(false) => {
                if !matches!(self.state, State::Connecting { .. }) {
                    self.state = State::Connecting { started_at_ms: now_ms };
                }
            }
            Err(err) if matches!(err.kind(), AsdErrorKind::NotReady | AsdErrorKind::SoftErr) => {
                // remote-caused; retry next tick per §4.5 failure semantics.
            }
            Err(err) => return Err(err),
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyThenOk {
        attempts: u32,
        succeed_on: u32,
    }

    impl ConnectAttempt for FlakyThenOk {
        fn try_connect(&mut self, _connect_handle: ConnectHandle) -> Result<bool, AsdError> {
            self.attempts += 1;
            return Ok(self.attempts >= self.succeed_on);
        }
    }

    #[test]
    fn connects_and_emits_rst_once() {
        let mut manager = ConnectManager::new(42, true);
        let mut attempt = FlakyThenOk { attempts: 0, succeed_on: 2 };
        let params = AsdParams::default();

        let mut rsts = 0;
        manager.tick(0, &params, &mut attempt, |_| rsts += 1).unwrap();
        assert!(!manager.is_connected());
        assert_eq!(rsts, 0);

        manager.tick(10, &params, &mut attempt, |_| rsts += 1).unwrap();
        assert!(manager.is_connected());
        assert_eq!(rsts, 1);

        manager.tick(20, &params, &mut attempt, |_| rsts += 1).unwrap();
        assert_eq!(rsts, 1, "already connected, no further connect attempts or RSTs");
    }

    #[test]
    fn outstanding_attempt_past_timeout_clears_for_retry() {
        let mut manager = ConnectManager::new(1, true);
        let mut attempt = FlakyThenOk { attempts: 0, succeed_on: 100 };
        let params = AsdParams { connect_timeout_ms: 50, ..AsdParams::default() };

        manager.tick(0, &params, &mut attempt, |_| {}).unwrap();
        manager.tick(100, &params, &mut attempt, |_| {}).unwrap();
        assert!(!manager.is_connected());
    }

    #[test]
    fn unconfigured_remote_never_attempts() {
        let mut manager = ConnectManager::new(1, false);
        let mut attempt = FlakyThenOk { attempts: 0, succeed_on: 1 };
        manager.tick(0, &AsdParams::default(), &mut attempt, |_| {}).unwrap();
        assert_eq!(attempt.attempts, 0);
    }
}
