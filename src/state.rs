//! Locomotion state machine.
//!
//! Resolves exactly one [`LocomotionState`] per tick from the signals the
//! rest of the pipeline produced. Some states are protected: landings play
//! for a fixed duration, the ground-pound sequence runs to completion, and
//! freshly entered jumps cannot be overwritten by generic airborne logic.
//! Executed action commands always win over protection.

use bevy::prelude::*;

use crate::config::StateSettings;
use crate::events::{EventChannel, StateEvent};
use crate::jump::{ActionCommand, ActionVariant, GroundPoundPhase};

/// The character's overall state.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LocomotionState {
    #[default]
    Idle,
    Walking,
    Running,
    Sprinting,
    CrouchIdle,
    CrouchWalk,
    Jumping,
    DoubleJumping,
    TripleJumping,
    LongJump,
    Backflip,
    SlopeJump,
    GroundPoundJump,
    Falling,
    GroundPoundStart,
    GroundPoundFall,
    GroundPoundLand,
    Diving,
    GroundDiving,
    Landing,
    HardLanding,
    SlopeSliding,
    Skidding,
    SkidTurn,
    HangTime,
    LedgeGrab,
    LedgeClimb,
}

impl LocomotionState {
    /// Single, double or triple jump.
    pub fn is_normal_jump(self) -> bool {
        matches!(self, Self::Jumping | Self::DoubleJumping | Self::TripleJumping)
    }

    /// Jumps held until landing.
    pub fn is_special_jump(self) -> bool {
        matches!(
            self,
            Self::LongJump | Self::Backflip | Self::SlopeJump | Self::GroundPoundJump | Self::Diving
        )
    }

    /// Any state entered by a jump or dive command.
    pub fn is_jump(self) -> bool {
        self.is_normal_jump() || self.is_special_jump() || self == Self::GroundDiving
    }

    pub fn is_landing(self) -> bool {
        matches!(self, Self::Landing | Self::HardLanding | Self::GroundPoundLand)
    }

    /// Airborne part of the ground-pound sequence.
    pub fn is_ground_pound(self) -> bool {
        matches!(self, Self::GroundPoundStart | Self::HangTime | Self::GroundPoundFall)
    }

    pub fn is_crouching(self) -> bool {
        matches!(self, Self::CrouchIdle | Self::CrouchWalk)
    }

    pub fn is_diving(self) -> bool {
        matches!(self, Self::Diving | Self::GroundDiving)
    }

    /// State entered directly when `command` executes.
    pub fn for_command(command: &ActionCommand) -> Self {
        match command.variant {
            ActionVariant::Jump
            | ActionVariant::DoubleJump
            | ActionVariant::TripleJump => match command.animation {
                ActionVariant::DoubleJump => Self::DoubleJumping,
                ActionVariant::TripleJump => Self::TripleJumping,
                _ => Self::Jumping,
            },
            ActionVariant::LongJump => Self::LongJump,
            ActionVariant::Backflip => Self::Backflip,
            ActionVariant::SlopeJump => Self::SlopeJump,
            ActionVariant::GroundPoundJump => Self::GroundPoundJump,
            ActionVariant::GroundPound if command.launch.y < 0.0 => Self::GroundPoundFall,
            ActionVariant::GroundPound => Self::GroundPoundStart,
            ActionVariant::Dive => Self::Diving,
            ActionVariant::GroundDive => Self::GroundDiving,
            ActionVariant::LedgeClimb => Self::LedgeClimb,
        }
    }
}

/// Everything the state machine reads for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSignals {
    pub now: f32,
    pub grounded: bool,
    /// Airborne→grounded edge this tick.
    pub just_landed: bool,
    /// Departure height minus landing height.
    pub fall_distance: f32,
    /// The action chain processed a ground-pound landing this tick.
    pub ground_pound_landed: bool,
    pub ground_pound_phase: Option<GroundPoundPhase>,
    /// Hang time is suspending the character.
    pub hanging: bool,
    pub on_ledge: bool,
    pub climbing: bool,
    /// Command executed this tick, if any.
    pub executed: Option<ActionCommand>,
    pub sliding: bool,
    pub skidding: bool,
    pub horizontal_speed: f32,
    pub vertical_velocity: f32,
    pub crouch_held: bool,
    pub has_input: bool,
}

impl Default for StateSignals {
    fn default() -> Self {
        Self {
            now: 0.0,
            grounded: true,
            just_landed: false,
            fall_distance: 0.0,
            ground_pound_landed: false,
            ground_pound_phase: None,
            hanging: false,
            on_ledge: false,
            climbing: false,
            executed: None,
            sliding: false,
            skidding: false,
            horizontal_speed: 0.0,
            vertical_velocity: 0.0,
            crouch_held: false,
            has_input: false,
        }
    }
}

/// Current state plus the bookkeeping used for duration-gated protection.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct StateRecord {
    pub current: LocomotionState,
    pub previous: LocomotionState,
    pub entered_at: f32,
}

impl Default for StateRecord {
    fn default() -> Self {
        Self {
            current: LocomotionState::Idle,
            previous: LocomotionState::Idle,
            entered_at: 0.0,
        }
    }
}

/// Owns the [`LocomotionState`].
#[derive(Debug, Clone)]
pub struct LocomotionStateMachine {
    settings: StateSettings,
    record: StateRecord,
    /// Airborne since the last landing. A character spawned on the ground
    /// never lands.
    airborne: bool,
}

impl LocomotionStateMachine {
    pub fn new(settings: StateSettings) -> Self {
        Self {
            settings,
            record: StateRecord::default(),
            airborne: false,
        }
    }

    pub fn current(&self) -> LocomotionState {
        self.record.current
    }

    pub fn previous(&self) -> LocomotionState {
        self.record.previous
    }

    pub fn record(&self) -> &StateRecord {
        &self.record
    }

    /// Time spent in the current state.
    pub fn time_in_state(&self, now: f32) -> f32 {
        now - self.record.entered_at
    }

    /// Fixed duration of a landing state.
    pub fn landing_duration(&self, state: LocomotionState) -> f32 {
        match state {
            LocomotionState::HardLanding => self.settings.hard_landing_duration,
            LocomotionState::GroundPoundLand => self.settings.ground_pound_land_duration,
            _ => self.settings.landing_duration,
        }
    }

    /// Resolve this tick's state.
    pub fn tick(&mut self, signals: &StateSignals, events: &EventChannel) -> LocomotionState {
        let mut landed = false;
        if !signals.grounded {
            self.airborne = true;
        } else if self.airborne {
            self.airborne = false;
            if signals.just_landed {
                let landing = self.classify_landing(signals);
                self.transition(landing, signals.now, events);
                landed = true;
            }
        }

        if let Some(command) = signals.executed {
            self.transition(LocomotionState::for_command(&command), signals.now, events);
            return self.record.current;
        }
        if landed {
            return self.record.current;
        }

        let next = self.resolve(signals);
        self.transition(next, signals.now, events);
        self.record.current
    }

    fn classify_landing(&self, signals: &StateSignals) -> LocomotionState {
        if signals.ground_pound_landed {
            LocomotionState::GroundPoundLand
        } else if signals.fall_distance >= self.settings.hard_landing_distance
            || self.record.current.is_diving()
        {
            LocomotionState::HardLanding
        } else {
            LocomotionState::Landing
        }
    }

    fn resolve(&self, signals: &StateSignals) -> LocomotionState {
        let s = &self.settings;
        let current = self.record.current;
        let elapsed = self.time_in_state(signals.now);

        if signals.climbing {
            return LocomotionState::LedgeClimb;
        }
        if signals.on_ledge {
            return LocomotionState::LedgeGrab;
        }

        // Landings play out while on the ground.
        if current.is_landing() && signals.grounded && elapsed < self.landing_duration(current) {
            return current;
        }

        // Hang time and the ground-pound sequence.
        if current.is_ground_pound() {
            if let Some(state) = self.resolve_ground_pound(signals, elapsed) {
                return state;
            }
        }

        // Freshly entered jumps.
        if current.is_jump() && elapsed < s.jump_grace {
            return current;
        }

        if !signals.grounded {
            // Special jumps hold until landing.
            if current.is_special_jump() || current == LocomotionState::GroundDiving {
                return current;
            }
            // Normal jumps fall once they have peaked and lasted long enough.
            if current.is_normal_jump() {
                let descending = signals.vertical_velocity < s.falling_velocity_threshold;
                return if descending && elapsed >= s.min_jump_time {
                    LocomotionState::Falling
                } else {
                    current
                };
            }
            return LocomotionState::Falling;
        }

        if current == LocomotionState::GroundDiving
            && (elapsed < s.ground_dive_min_duration
                || signals.horizontal_speed > s.ground_dive_end_speed)
        {
            return current;
        }

        self.resolve_grounded(signals, elapsed)
    }

    fn resolve_ground_pound(&self, signals: &StateSignals, elapsed: f32) -> Option<LocomotionState> {
        let current = self.record.current;
        match signals.ground_pound_phase {
            Some(GroundPoundPhase::Start) if signals.hanging => {
                if current == LocomotionState::GroundPoundStart
                    && elapsed < self.settings.ground_pound_start_duration
                {
                    Some(current)
                } else {
                    Some(LocomotionState::HangTime)
                }
            }
            Some(GroundPoundPhase::Start) => {
                warn!(?current, "ground pound started without hang time, forcing fall");
                Some(LocomotionState::GroundPoundFall)
            }
            Some(GroundPoundPhase::Fall) => {
                if signals.grounded && current == LocomotionState::GroundPoundFall {
                    warn!("grounded mid ground pound without a landing, holding fall");
                }
                Some(LocomotionState::GroundPoundFall)
            }
            Some(GroundPoundPhase::Land | GroundPoundPhase::Cancelled) | None => {
                warn!(?current, "ground pound state without an active pound, recovering");
                if signals.grounded {
                    None
                } else {
                    Some(LocomotionState::Falling)
                }
            }
        }
    }

    fn resolve_grounded(&self, signals: &StateSignals, elapsed: f32) -> LocomotionState {
        let s = &self.settings;
        let current = self.record.current;

        if signals.skidding {
            return LocomotionState::Skidding;
        }
        if current == LocomotionState::Skidding && signals.has_input {
            return LocomotionState::SkidTurn;
        }
        if current == LocomotionState::SkidTurn && elapsed < s.skid_turn_duration {
            return current;
        }
        if signals.sliding {
            return LocomotionState::SlopeSliding;
        }

        let speed = signals.horizontal_speed;
        if signals.crouch_held {
            return if speed < s.idle_threshold {
                LocomotionState::CrouchIdle
            } else {
                LocomotionState::CrouchWalk
            };
        }

        if speed < s.idle_threshold {
            LocomotionState::Idle
        } else if speed < s.running_threshold {
            LocomotionState::Walking
        } else if speed < s.sprinting_threshold {
            LocomotionState::Running
        } else {
            LocomotionState::Sprinting
        }
    }

    fn transition(&mut self, next: LocomotionState, now: f32, events: &EventChannel) {
        let from = self.record.current;
        if next == from {
            return;
        }
        self.record = StateRecord {
            current: next,
            previous: from,
            entered_at: now,
        };
        debug!(?from, to = ?next, "locomotion state changed");
        events.publish_state(StateEvent::StateChanged { from, to: next });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, LocomotionEvent};
    use std::sync::{Arc, Mutex};

    fn machine() -> LocomotionStateMachine {
        LocomotionStateMachine::new(StateSettings::default())
    }

    fn command(variant: ActionVariant) -> ActionCommand {
        ActionCommand {
            variant,
            animation: variant,
            launch: Vec3::Y * 8.0,
            facing: None,
            chain_counter: 0,
        }
    }

    fn changes(channel: &EventChannel) -> Arc<Mutex<Vec<LocomotionState>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        channel.subscribe(EventKind::StateChanged, move |e| {
            if let LocomotionEvent::State(StateEvent::StateChanged { to, .. }) = e {
                sink.lock().unwrap().push(*to);
            }
        });
        log
    }

    fn airborne(now: f32, vertical: f32) -> StateSignals {
        StateSignals {
            now,
            grounded: false,
            vertical_velocity: vertical,
            ..default()
        }
    }

    fn landing(now: f32, fall_distance: f32) -> StateSignals {
        StateSignals {
            now,
            just_landed: true,
            fall_distance,
            ..default()
        }
    }

    // ==================== Grounded Resolution ====================

    #[test]
    fn speed_bands() {
        let mut m = machine();
        let events = EventChannel::new();
        let at = |speed| StateSignals {
            horizontal_speed: speed,
            ..default()
        };

        assert_eq!(m.tick(&at(0.0), &events), LocomotionState::Idle);
        assert_eq!(m.tick(&at(2.0), &events), LocomotionState::Walking);
        assert_eq!(m.tick(&at(5.0), &events), LocomotionState::Running);
        assert_eq!(m.tick(&at(9.0), &events), LocomotionState::Sprinting);
    }

    #[test]
    fn grounded_priority_order() {
        let mut m = machine();
        let events = EventChannel::new();
        let all = StateSignals {
            skidding: true,
            sliding: true,
            crouch_held: true,
            horizontal_speed: 5.0,
            ..default()
        };
        assert_eq!(m.tick(&all, &events), LocomotionState::Skidding);

        let no_skid = StateSignals {
            skidding: false,
            has_input: false,
            ..all
        };
        assert_eq!(m.tick(&no_skid, &events), LocomotionState::SlopeSliding);

        let crouch = StateSignals {
            sliding: false,
            ..no_skid
        };
        assert_eq!(m.tick(&crouch, &events), LocomotionState::CrouchWalk);
    }

    #[test]
    fn skid_turn_plays_after_skid() {
        let mut m = machine();
        let events = EventChannel::new();
        let skid = StateSignals {
            skidding: true,
            has_input: true,
            horizontal_speed: 5.0,
            ..default()
        };
        m.tick(&skid, &events);

        let turned = StateSignals {
            now: 0.1,
            skidding: false,
            ..skid
        };
        assert_eq!(m.tick(&turned, &events), LocomotionState::SkidTurn);
        assert_eq!(m.tick(&StateSignals { now: 0.2, ..turned }, &events), LocomotionState::SkidTurn);
        assert_eq!(m.tick(&StateSignals { now: 0.5, ..turned }, &events), LocomotionState::Running);
    }

    // ==================== Landing ====================

    #[test]
    fn hard_landing_from_fall_distance() {
        let mut m = machine();
        let events = EventChannel::new();
        m.tick(&airborne(0.0, -5.0), &events);
        assert_eq!(m.current(), LocomotionState::Falling);

        assert_eq!(m.tick(&landing(0.5, 6.0), &events), LocomotionState::HardLanding);
        assert_eq!(m.landing_duration(m.current()), 0.5);

        // Protected for the whole hard-landing duration.
        assert_eq!(m.tick(&StateSignals { now: 0.9, ..default() }, &events), LocomotionState::HardLanding);
        assert_eq!(m.tick(&StateSignals { now: 1.05, ..default() }, &events), LocomotionState::Idle);
    }

    #[test]
    fn short_fall_is_ordinary_landing() {
        let mut m = machine();
        let events = EventChannel::new();
        m.tick(&airborne(0.0, -5.0), &events);
        assert_eq!(m.tick(&landing(0.5, 1.0), &events), LocomotionState::Landing);
    }

    #[test]
    fn diving_landing_is_hard() {
        let mut m = machine();
        let events = EventChannel::new();
        m.tick(
            &StateSignals {
                executed: Some(command(ActionVariant::Dive)),
                ..airborne(0.0, 3.0)
            },
            &events,
        );
        assert_eq!(m.tick(&landing(0.4, 0.5), &events), LocomotionState::HardLanding);
    }

    #[test]
    fn ground_pound_landing_is_distinct() {
        let mut m = machine();
        let events = EventChannel::new();
        m.tick(&airborne(0.0, -5.0), &events);
        let signals = StateSignals {
            ground_pound_landed: true,
            ..landing(0.5, 8.0)
        };
        assert_eq!(m.tick(&signals, &events), LocomotionState::GroundPoundLand);
    }

    #[test]
    fn exactly_one_landing_per_edge() {
        let mut m = machine();
        let events = EventChannel::new();
        let log = changes(&events);
        m.tick(&airborne(0.0, -5.0), &events);
        m.tick(&landing(0.5, 6.0), &events);
        for i in 1..10 {
            m.tick(&StateSignals { now: 0.5 + i as f32 * 0.02, ..default() }, &events);
        }

        let landings = log.lock().unwrap().iter().filter(|s| s.is_landing()).count();
        assert_eq!(landings, 1);
    }

    #[test]
    fn jump_on_landing_tick_preempts_landing() {
        let mut m = machine();
        let events = EventChannel::new();
        let log = changes(&events);
        m.tick(&airborne(0.0, -5.0), &events);

        let signals = StateSignals {
            executed: Some(command(ActionVariant::Jump)),
            ..landing(0.5, 1.0)
        };
        assert_eq!(m.tick(&signals, &events), LocomotionState::Jumping);
        assert_eq!(
            *log.lock().unwrap(),
            vec![LocomotionState::Falling, LocomotionState::Landing, LocomotionState::Jumping]
        );
    }

    // ==================== Jump Protection ====================

    #[test]
    fn normal_jump_falls_only_after_both_gates() {
        let mut m = machine();
        let events = EventChannel::new();
        m.tick(
            &StateSignals {
                executed: Some(command(ActionVariant::Jump)),
                ..default()
            },
            &events,
        );

        // Descending but too early.
        assert_eq!(m.tick(&airborne(0.15, -3.0), &events), LocomotionState::Jumping);
        // Late enough but still rising.
        assert_eq!(m.tick(&airborne(0.3, 2.0), &events), LocomotionState::Jumping);
        assert_eq!(m.tick(&airborne(0.35, -3.0), &events), LocomotionState::Falling);
    }

    #[test]
    fn grace_protects_fresh_jump_on_ground() {
        let mut m = machine();
        let events = EventChannel::new();
        m.tick(
            &StateSignals {
                executed: Some(command(ActionVariant::DoubleJump)),
                ..default()
            },
            &events,
        );
        // Still grounded on the launch tick: no overwrite by Idle.
        assert_eq!(m.tick(&StateSignals { now: 0.05, ..default() }, &events), LocomotionState::DoubleJumping);
    }

    #[test]
    fn special_jump_held_until_grounded() {
        let mut m = machine();
        let events = EventChannel::new();
        m.tick(
            &StateSignals {
                executed: Some(command(ActionVariant::LongJump)),
                ..default()
            },
            &events,
        );
        assert_eq!(m.tick(&airborne(1.0, -10.0), &events), LocomotionState::LongJump);
        assert_eq!(m.tick(&landing(1.2, 0.5), &events), LocomotionState::Landing);
    }

    #[test]
    fn post_triple_jump_keeps_triple_state() {
        let command = ActionCommand {
            variant: ActionVariant::Jump,
            animation: ActionVariant::TripleJump,
            ..command(ActionVariant::Jump)
        };
        assert_eq!(LocomotionState::for_command(&command), LocomotionState::TripleJumping);
    }

    // ==================== Ground Pound ====================

    #[test]
    fn ground_pound_sequence() {
        let mut m = machine();
        let events = EventChannel::new();
        let start = ActionCommand {
            launch: Vec3::ZERO,
            ..command(ActionVariant::GroundPound)
        };
        let hanging = StateSignals {
            hanging: true,
            ground_pound_phase: Some(GroundPoundPhase::Start),
            ..airborne(0.0, 0.0)
        };
        assert_eq!(
            m.tick(&StateSignals { executed: Some(start), ..hanging }, &events),
            LocomotionState::GroundPoundStart
        );
        assert_eq!(m.tick(&StateSignals { now: 0.1, ..hanging }, &events), LocomotionState::GroundPoundStart);
        assert_eq!(m.tick(&StateSignals { now: 0.2, ..hanging }, &events), LocomotionState::HangTime);

        let fall = StateSignals {
            hanging: false,
            ground_pound_phase: Some(GroundPoundPhase::Fall),
            ..airborne(0.3, -25.0)
        };
        assert_eq!(m.tick(&fall, &events), LocomotionState::GroundPoundFall);
    }

    #[test]
    fn inconsistent_ground_pound_self_heals() {
        let mut m = machine();
        let events = EventChannel::new();
        let start = ActionCommand {
            launch: Vec3::ZERO,
            ..command(ActionVariant::GroundPound)
        };
        m.tick(
            &StateSignals {
                executed: Some(start),
                hanging: true,
                ground_pound_phase: Some(GroundPoundPhase::Start),
                ..airborne(0.0, 0.0)
            },
            &events,
        );

        // Phase says fall while the state still shows the wind-up.
        let fall = StateSignals {
            ground_pound_phase: Some(GroundPoundPhase::Fall),
            ..airborne(0.05, -25.0)
        };
        assert_eq!(m.tick(&fall, &events), LocomotionState::GroundPoundFall);

        // Grounded with no landing event: re-assert the fall.
        let grounded = StateSignals {
            grounded: true,
            ..fall
        };
        assert_eq!(m.tick(&grounded, &events), LocomotionState::GroundPoundFall);

        // Pound vanished entirely while grounded: degrade to a grounded state.
        let vanished = StateSignals {
            ground_pound_phase: None,
            ..grounded
        };
        assert_eq!(m.tick(&vanished, &events), LocomotionState::Idle);
    }

    // ==================== Ledges & Events ====================

    #[test]
    fn ledge_states() {
        let mut m = machine();
        let events = EventChannel::new();
        let hang = StateSignals {
            on_ledge: true,
            ..airborne(0.0, 0.0)
        };
        assert_eq!(m.tick(&hang, &events), LocomotionState::LedgeGrab);
        assert_eq!(
            m.tick(&StateSignals { climbing: true, on_ledge: false, ..hang }, &events),
            LocomotionState::LedgeClimb
        );
    }

    #[test]
    fn state_changed_only_on_change() {
        let mut m = machine();
        let events = EventChannel::new();
        let log = changes(&events);
        for i in 0..5 {
            m.tick(&StateSignals { now: i as f32, horizontal_speed: 5.0, ..default() }, &events);
        }
        assert_eq!(*log.lock().unwrap(), vec![LocomotionState::Running]);
        assert_eq!(m.previous(), LocomotionState::Idle);
    }
}
