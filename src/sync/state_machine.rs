//! Lifecycle of the remote event stream
//!
//! `Disconnected → Connecting → Connected → Disconnected`, with a failed
//! connect attempt falling straight back to `Disconnected`.

use super::{SyncError, SyncResult};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

#[derive(Debug)]
pub struct ConnectionStateMachine {
    current_state: ConnectionState,
    previous_state: Option<ConnectionState>,
    transition_count: u64,
    state_entered_at: Instant,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Disconnected,
            previous_state: None,
            transition_count: 0,
            state_entered_at: Instant::now(),
        }
    }

    pub fn current_state(&self) -> ConnectionState {
        self.current_state
    }

    pub fn previous_state(&self) -> Option<ConnectionState> {
        self.previous_state
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    pub fn can_transition_to(&self, new_state: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self.current_state, new_state) {
            (Disconnected, Connecting) => true,
            (Connecting, Connected) => true,
            (Connecting, Disconnected) => true,
            (Connected, Disconnected) => true,
            (state, new_state) if state == new_state => true,
            _ => false,
        }
    }

    pub fn transition_to(&mut self, new_state: ConnectionState) -> SyncResult<()> {
        if !self.can_transition_to(new_state) {
            return Err(SyncError::InvalidTransition {
                from: self.current_state,
                to: new_state,
            });
        }
        if new_state == self.current_state {
            return Ok(());
        }

        let old_state = self.current_state;
        debug!("📡 Stream state: {} -> {} (transition #{})", old_state, new_state, self.transition_count + 1);

        self.previous_state = Some(old_state);
        self.current_state = new_state;
        self.transition_count += 1;
        self.state_entered_at = Instant::now();

        if new_state == ConnectionState::Connected {
            info!("📡 Event stream connected");
        } else if old_state == ConnectionState::Connected {
            info!("📡 Event stream disconnected");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.current_state == ConnectionState::Connected
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
