//! Tick-driven frame animation
//!
//! Every online subject with an animated config carries a
//! [`PlayerAnimationState`]. Each tick bumps its counter; once the counter
//! reaches the config's frame duration the frame advances per the loop mode
//! and the new frame is pushed to nearby viewers.

use crate::host::{HostServer, SessionSnapshot};
use crate::model::{LoopMode, SkinConfig};
use crate::protocol::{ProtocolError, SkinBroadcaster};
use crate::sync::ConfigCache;
use crate::utils::log_once::LogOnce;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Direction of travel through the frame list (used by ping-pong)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerAnimationState {
    pub frame_index: usize,
    pub tick_counter: u32,
    pub direction: Direction,
}

/// Next frame index for `mode`, updating the ping-pong direction in place.
///
/// Ping-pong bounces: it walks forward to the last frame, turns around and
/// walks back to frame 0, then turns around again. Each end frame is shown once.
pub fn advance_frame(current: usize, frame_count: usize, mode: LoopMode, direction: &mut Direction) -> usize {
    if frame_count <= 1 {
        return 0;
    }
    let last = frame_count - 1;
    let current = current.min(last);
    match mode {
        LoopMode::Loop => (current + 1) % frame_count,
        LoopMode::Once => (current + 1).min(last),
        LoopMode::PingPong => {
            if current == last {
                *direction = Direction::Backward;
            } else if current == 0 {
                *direction = Direction::Forward;
            }
            match direction {
                Direction::Forward => current + 1,
                Direction::Backward => current - 1,
            }
        }
    }
}

/// Who gets a subject's frame updates
#[derive(Debug, Clone, Copy)]
pub struct VisibilityFilter {
    radius_squared: f64,
}

impl VisibilityFilter {
    pub fn new(radius: f64) -> Self {
        Self {
            radius_squared: radius * radius,
        }
    }

    pub fn admits(&self, host: &dyn HostServer, viewer: &SessionSnapshot, subject: &SessionSnapshot) -> bool {
        viewer.id != subject.id
            && viewer.location.same_region(&subject.location)
            && viewer.location.distance_squared(&subject.location) < self.radius_squared
            && host.can_see(viewer.id, subject.id)
    }
}

pub struct AnimationScheduler {
    states: HashMap<Uuid, PlayerAnimationState>,
    filter: VisibilityFilter,
    warmup_ticks: u64,
    ticks_seen: u64,
    send_failures: LogOnce<Uuid>,
    unavailable_logged: bool,
}

impl AnimationScheduler {
    pub fn new(visibility_radius: f64, start_delay_ticks: u64) -> Self {
        Self {
            states: HashMap::new(),
            filter: VisibilityFilter::new(visibility_radius),
            warmup_ticks: start_delay_ticks,
            ticks_seen: 0,
            send_failures: LogOnce::new(),
            unavailable_logged: false,
        }
    }

    pub fn state(&self, subject: Uuid) -> Option<PlayerAnimationState> {
        self.states.get(&subject).copied()
    }

    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    /// Forget a subject's playback position (config replaced or disconnect)
    pub fn reset(&mut self, subject: Uuid) {
        self.states.remove(&subject);
        self.send_failures.reset(&subject);
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.send_failures.clear();
    }

    /// Advance one subject's state; returns the new frame index when it changed frame
    pub fn step(&mut self, subject: Uuid, config: &SkinConfig) -> Option<usize> {
        let state = self.states.entry(subject).or_default();
        state.tick_counter += 1;
        if state.tick_counter < config.frame_duration_ticks() {
            return None;
        }
        state.tick_counter = 0;
        state.frame_index = advance_frame(
            state.frame_index,
            config.frame_count(),
            config.loop_mode,
            &mut state.direction,
        );
        Some(state.frame_index)
    }

    /// One scheduler pass over all online subjects
    pub fn tick(&mut self, host: &dyn HostServer, configs: &ConfigCache, broadcaster: &SkinBroadcaster) {
        self.ticks_seen += 1;
        if self.ticks_seen <= self.warmup_ticks {
            return;
        }

        let sessions = host.online_sessions();
        for subject in &sessions {
            let Some(config) = configs.get(subject.id) else {
                continue;
            };
            if !config.is_animated() {
                continue;
            }
            let Some(index) = self.step(subject.id, &config) else {
                continue;
            };
            let Some(frame) = config.frame(index).and_then(|f| f.to_property()) else {
                continue;
            };

            for viewer in &sessions {
                if !self.filter.admits(host, viewer, subject) {
                    continue;
                }
                match broadcaster.send_skin_update(viewer.id, subject, &frame) {
                    Ok(()) => {}
                    Err(ProtocolError::StaleViewer { .. }) => {}
                    Err(e @ ProtocolError::ExternalBinding { .. }) => {
                        if !self.unavailable_logged {
                            self.unavailable_logged = true;
                            warn!("Animation frames cannot be broadcast: {}", e);
                        }
                    }
                    Err(e) => {
                        if self.send_failures.first(subject.id) {
                            warn!("⚠️ Failed to send frame of {} to {}: {}", subject.name, viewer.name, e);
                        } else {
                            debug!("Frame send to {} failed again: {}", viewer.name, e);
                        }
                    }
                }
            }
        }

        self.states.retain(|id, _| sessions.iter().any(|s| s.id == *id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SkinFrame;

    fn config(frames: usize, mode: LoopMode, duration: i32) -> SkinConfig {
        let frames = (0..frames)
            .map(|i| SkinFrame {
                frame_index: i as u32,
                texture_value: format!("v{}", i),
                texture_signature: format!("s{}", i),
                texture_url: None,
            })
            .collect();
        SkinConfig::new(Uuid::new_v4(), "subject", frames)
            .with_loop_mode(mode)
            .with_frame_duration(duration)
    }

    fn run(frame_count: usize, mode: LoopMode, advances: usize) -> Vec<usize> {
        let mut dir = Direction::Forward;
        let mut index = 0;
        let mut seen = Vec::new();
        for _ in 0..advances {
            index = advance_frame(index, frame_count, mode, &mut dir);
            seen.push(index);
        }
        seen
    }

    #[test]
    fn test_loop_wraps_modulo() {
        for k in 1..=12 {
            assert_eq!(*run(4, LoopMode::Loop, k).last().unwrap(), k % 4);
        }
    }

    #[test]
    fn test_once_caps_at_last_frame() {
        let seen = run(3, LoopMode::Once, 6);
        assert_eq!(seen, vec![1, 2, 2, 2, 2, 2]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_ping_pong_reverses_at_both_ends() {
        let seen = run(4, LoopMode::PingPong, 8);
        // reverses at the last frame, then again at frame 0
        assert_eq!(seen, vec![1, 2, 3, 2, 1, 0, 1, 2]);
    }

    #[test]
    fn test_ping_pong_two_frames() {
        assert_eq!(run(2, LoopMode::PingPong, 4), vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_single_or_empty_stays_at_zero() {
        for mode in [LoopMode::Loop, LoopMode::Once, LoopMode::PingPong] {
            assert!(run(1, mode, 5).iter().all(|i| *i == 0));
            assert!(run(0, mode, 5).iter().all(|i| *i == 0));
        }
    }

    #[test]
    fn test_step_respects_frame_duration() {
        let mut scheduler = AnimationScheduler::new(64.0, 0);
        let cfg = config(3, LoopMode::Loop, 3);
        let id = cfg.subject();
        assert_eq!(scheduler.step(id, &cfg), None);
        assert_eq!(scheduler.step(id, &cfg), None);
        assert_eq!(scheduler.step(id, &cfg), Some(1));
        assert_eq!(scheduler.state(id).unwrap().tick_counter, 0);
        scheduler.reset(id);
        assert!(scheduler.state(id).is_none());
    }
}
