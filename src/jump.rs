//! Jump and action chain.
//!
//! The [`JumpChainMachine`] decides which jump or action variant fires on a
//! rising input edge. It owns the combo counter, per-button consumed latches,
//! the ground-pound sequence with its optional hang time, and a short jump
//! buffer for presses that arrive just before landing.
//!
//! Decisions are only made on edges (`on_*_edge`). [`JumpChainMachine::tick`]
//! advances timers: hang-time expiry, landing bookkeeping, chain-window expiry
//! and buffered jumps.
//!
//! # Jump edge, first match wins
//!
//! | Condition | Result |
//! |---|---|
//! | hanging on a ledge | ledge climb |
//! | grounded, ground-pound landing within its window | ground-pound jump |
//! | grounded, crouch held past the hold delay | long jump, backflip or plain jump |
//! | grounded, skidding, skid backflip unused | backflip |
//! | grounded on a steep surface that is sliding or about to | slope jump |
//! | grounded | chain jump (single, double, triple) |
//! | airborne | buffered |

use bevy::prelude::*;

use crate::config::JumpSettings;
use crate::events::{ActionEvent, EventChannel};
use crate::input::InputButton;

/// Every jump or action the chain can execute.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActionVariant {
    #[default]
    Jump,
    DoubleJump,
    TripleJump,
    LongJump,
    Backflip,
    SlopeJump,
    GroundPoundJump,
    GroundPound,
    Dive,
    GroundDive,
    LedgeClimb,
}

impl ActionVariant {
    /// Variants that take part in the single/double/triple combo.
    pub fn is_chain(self) -> bool {
        matches!(self, Self::Jump | Self::DoubleJump | Self::TripleJump)
    }

    /// Jumps whose airborne state is held until landing.
    pub fn is_special_jump(self) -> bool {
        matches!(
            self,
            Self::LongJump | Self::Backflip | Self::GroundPoundJump | Self::Dive | Self::SlopeJump
        )
    }
}

/// Phase of a ground-pound sequence.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroundPoundPhase {
    /// Wind-up; the character hangs in the air if hang time is configured.
    Start,
    /// Downward force applied.
    Fall,
    /// Hit the ground.
    Land,
    /// Cancelled into a dive.
    Cancelled,
}

/// An executed jump or action.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct ActionCommand {
    pub variant: ActionVariant,
    /// Variant the animation layer should play. Differs from `variant` for
    /// chain jumps past the triple, which keep the triple-jump animation.
    pub animation: ActionVariant,
    /// Launch velocity. The vertical part replaces the body's vertical
    /// velocity; a non-zero horizontal part replaces momentum.
    pub launch: Vec3,
    /// Direction the character must face, if the action commands one.
    pub facing: Option<Vec3>,
    /// Chain counter after the command executed.
    pub chain_counter: u32,
}

impl ActionCommand {
    fn new(variant: ActionVariant, launch: Vec3) -> Self {
        Self {
            variant,
            animation: variant,
            launch,
            facing: None,
            chain_counter: 0,
        }
    }

    fn facing(mut self, direction: Vec3) -> Self {
        let flat = Vec3::new(direction.x, 0.0, direction.z).normalize_or_zero();
        if flat != Vec3::ZERO {
            self.facing = Some(flat);
        }
        self
    }
}

/// Pending hang-time suspension.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct HangTime {
    pub start: f32,
    pub duration: f32,
    /// Force applied when the hang ends.
    pub pending_force: Vec3,
}

/// Per-button latches preventing re-fire while held.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumedFlags {
    pub jump: bool,
    pub crouch: bool,
    pub action: bool,
}

/// Chain state owned by the [`JumpChainMachine`].
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct JumpChainState {
    pub chain_counter: u32,
    pub last_action_time: f32,
    pub consumed: ConsumedFlags,
    /// Action currently in progress, cleared on landing.
    pub active_action: Option<ActionVariant>,
    pub hang_time: Option<HangTime>,
    /// Phase of the running ground pound.
    pub ground_pound: Option<GroundPoundPhase>,
    pub ground_pound_started_at: f32,
    pub ground_pound_landed_at: Option<f32>,
    /// Backflip already used during the current skid.
    pub skid_backflip_consumed: bool,
    /// Airborne jump press remembered until this time.
    pub buffered_until: Option<f32>,
    pub crouch_pressed_at: Option<f32>,
}

impl Default for JumpChainState {
    fn default() -> Self {
        Self {
            chain_counter: 0,
            last_action_time: f32::NEG_INFINITY,
            consumed: ConsumedFlags::default(),
            active_action: None,
            hang_time: None,
            ground_pound: None,
            ground_pound_started_at: f32::NEG_INFINITY,
            ground_pound_landed_at: None,
            skid_backflip_consumed: false,
            buffered_until: None,
            crouch_pressed_at: None,
        }
    }
}

/// Everything the chain reads about the character for one decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainContext {
    pub now: f32,
    /// Grounded including coyote time.
    pub grounded: bool,
    /// Clock time of the last landing.
    pub landed_at: f32,
    /// Standing on a surface too steep to walk.
    pub steep: bool,
    /// A slope slide is active or its activation delay is running.
    pub slide_engaged: bool,
    pub surface_normal: Vec3,
    pub horizontal_speed: f32,
    pub facing: Vec3,
    /// World input direction (zero without input).
    pub input_direction: Vec3,
    pub jump_held: bool,
    pub crouch_held: bool,
    pub skidding: bool,
    pub on_ledge: bool,
}

impl Default for ChainContext {
    fn default() -> Self {
        Self {
            now: 0.0,
            grounded: true,
            landed_at: f32::NEG_INFINITY,
            steep: false,
            slide_engaged: false,
            surface_normal: Vec3::Y,
            horizontal_speed: 0.0,
            facing: Vec3::NEG_Z,
            input_direction: Vec3::ZERO,
            jump_held: false,
            crouch_held: false,
            skidding: false,
            on_ledge: false,
        }
    }
}

/// The combo brain.
#[derive(Debug, Clone)]
pub struct JumpChainMachine {
    settings: JumpSettings,
    state: JumpChainState,
    was_grounded: bool,
    landed_from_ground_pound: bool,
}

impl JumpChainMachine {
    pub fn new(settings: JumpSettings) -> Self {
        Self {
            settings,
            state: JumpChainState::default(),
            was_grounded: false,
            landed_from_ground_pound: false,
        }
    }

    pub fn state(&self) -> &JumpChainState {
        &self.state
    }

    pub fn chain_counter(&self) -> u32 {
        self.state.chain_counter
    }

    pub fn is_hanging(&self) -> bool {
        self.state.hang_time.is_some()
    }

    pub fn is_ground_pounding(&self) -> bool {
        matches!(
            self.state.ground_pound,
            Some(GroundPoundPhase::Start | GroundPoundPhase::Fall)
        )
    }

    pub fn is_diving(&self) -> bool {
        self.state.active_action == Some(ActionVariant::Dive)
    }

    pub fn ground_pound_phase(&self) -> Option<GroundPoundPhase> {
        self.state.ground_pound
    }

    /// The last [`tick`](Self::tick) processed a ground-pound landing.
    pub fn landed_from_ground_pound(&self) -> bool {
        self.landed_from_ground_pound
    }

    fn interval_open(&self, now: f32) -> bool {
        now - self.state.last_action_time >= self.settings.min_jump_interval
    }

    fn crouch_hold_satisfied(&self, ctx: &ChainContext) -> bool {
        ctx.crouch_held
            && self
                .state
                .crouch_pressed_at
                .is_some_and(|t| ctx.now - t >= self.settings.crouch_hold_delay)
    }

    /// Rising jump edge.
    pub fn on_jump_edge(&mut self, ctx: &ChainContext, events: &EventChannel) -> Option<ActionCommand> {
        if self.state.consumed.jump || !self.interval_open(ctx.now) {
            self.state.consumed.jump = true;
            return None;
        }

        if !ctx.grounded && !ctx.on_ledge {
            if self.is_ground_pounding() || self.is_diving() {
                self.state.consumed.jump = true;
            } else {
                self.state.buffered_until = Some(ctx.now + self.settings.jump_buffer_time);
            }
            return None;
        }

        let command = self.decide_jump(ctx);
        self.state.consumed.jump = true;
        self.execute(command, ctx, events)
    }

    fn decide_jump(&mut self, ctx: &ChainContext) -> ActionCommand {
        let s = &self.settings;

        if ctx.on_ledge {
            return ActionCommand::new(ActionVariant::LedgeClimb, Vec3::Y * s.ledge_climb_speed);
        }

        if self
            .state
            .ground_pound_landed_at
            .is_some_and(|t| ctx.now - t <= s.ground_pound_jump_window)
        {
            return ActionCommand::new(
                ActionVariant::GroundPoundJump,
                Vec3::Y * s.ground_pound_jump_speed,
            );
        }

        if self.crouch_hold_satisfied(ctx) {
            let forward = direction_or(ctx.input_direction, ctx.facing);
            if ctx.horizontal_speed >= s.long_jump_speed_threshold {
                return ActionCommand::new(
                    ActionVariant::LongJump,
                    forward * s.long_jump_forward + Vec3::Y * s.long_jump_vertical,
                )
                .facing(forward);
            }
            if ctx.input_direction == Vec3::ZERO {
                let back = -direction_or(ctx.facing, Vec3::NEG_Z);
                return ActionCommand::new(
                    ActionVariant::Backflip,
                    back * s.backflip_backward + Vec3::Y * s.backflip_vertical,
                );
            }
            // Slow crouch-walk: falls through to a plain chain jump.
        } else if ctx.skidding && !self.state.skid_backflip_consumed {
            self.state.skid_backflip_consumed = true;
            // Skid backflip launches toward the new input direction.
            let toward = direction_or(ctx.input_direction, -ctx.facing);
            return ActionCommand::new(
                ActionVariant::Backflip,
                toward * s.backflip_backward + Vec3::Y * s.backflip_vertical,
            )
            .facing(toward);
        } else if ctx.steep && ctx.slide_engaged {
            let normal = ctx.surface_normal.normalize_or(Vec3::Y);
            return ActionCommand::new(ActionVariant::SlopeJump, normal * s.slope_jump_speed)
                .facing(Vec3::new(normal.x, 0.0, normal.z));
        }

        self.chain_jump(ctx)
    }

    fn chain_jump(&mut self, ctx: &ChainContext) -> ActionCommand {
        let s = &self.settings;
        let fast_enough = ctx.horizontal_speed >= s.chain_speed_threshold;
        let in_window = ctx.now - ctx.landed_at < s.chain_window;

        if self.state.chain_counter > 0 && !(in_window && fast_enough) {
            self.state.chain_counter = 0;
        }

        let counter = self.state.chain_counter;
        let (variant, animation, speed) = match counter {
            0 => (ActionVariant::Jump, ActionVariant::Jump, s.single_jump_speed),
            1 => (ActionVariant::DoubleJump, ActionVariant::DoubleJump, s.double_jump_speed),
            2 => (ActionVariant::TripleJump, ActionVariant::TripleJump, s.triple_jump_speed),
            _ => (ActionVariant::Jump, ActionVariant::TripleJump, s.single_jump_speed),
        };

        self.state.chain_counter = if fast_enough { counter + 1 } else { 0 };

        ActionCommand {
            variant,
            animation,
            launch: Vec3::Y * speed,
            facing: None,
            chain_counter: self.state.chain_counter,
        }
    }

    /// Rising action edge.
    pub fn on_action_edge(&mut self, ctx: &ChainContext, events: &EventChannel) -> Option<ActionCommand> {
        if self.state.consumed.action || !self.interval_open(ctx.now) || ctx.on_ledge {
            self.state.consumed.action = true;
            return None;
        }
        self.state.consumed.action = true;

        let s = &self.settings;
        let forward = direction_or(ctx.input_direction, ctx.facing);
        let dive = ActionCommand::new(
            ActionVariant::Dive,
            forward * s.dive_forward + Vec3::Y * s.dive_vertical,
        );
        let ground_dive = ActionCommand::new(
            ActionVariant::GroundDive,
            forward * s.ground_dive_forward + Vec3::Y * s.ground_dive_vertical,
        );
        let cancel_open = ctx.now - self.state.ground_pound_started_at <= s.dive_cancel_window;
        let can_air_dive = ctx.horizontal_speed >= s.dive_min_speed;
        let can_ground_dive = ctx.horizontal_speed >= s.ground_dive_speed_threshold;

        let command = if !ctx.grounded {
            if self.is_ground_pounding() && cancel_open {
                self.end_ground_pound(GroundPoundPhase::Cancelled, events);
                Some(dive)
            } else if !self.is_ground_pounding()
                && self.state.active_action != Some(ActionVariant::Dive)
                && can_air_dive
            {
                Some(dive)
            } else {
                None
            }
        } else if can_ground_dive && !ctx.crouch_held {
            Some(ground_dive)
        } else {
            None
        };

        let command = command?.facing(forward);
        events.publish_action(ActionEvent::Dive {
            grounded: command.variant == ActionVariant::GroundDive,
        });
        self.execute(command, ctx, events)
    }

    /// Rising crouch edge.
    pub fn on_crouch_edge(&mut self, ctx: &ChainContext, events: &EventChannel) -> Option<ActionCommand> {
        self.state.crouch_pressed_at = Some(ctx.now);
        if self.state.consumed.crouch || ctx.grounded || ctx.on_ledge {
            return None;
        }
        self.state.consumed.crouch = true;

        let diving = self.state.active_action == Some(ActionVariant::Dive);
        if diving || self.is_ground_pounding() || !self.interval_open(ctx.now) {
            return None;
        }

        let s = &self.settings;
        let force = Vec3::NEG_Y * s.ground_pound_speed;
        self.state.ground_pound = Some(GroundPoundPhase::Start);
        self.state.ground_pound_started_at = ctx.now;
        events.publish_action(ActionEvent::GroundPoundPhase(GroundPoundPhase::Start));

        let launch = if s.ground_pound_hang_time > 0.0 {
            self.state.hang_time = Some(HangTime {
                start: ctx.now,
                duration: s.ground_pound_hang_time,
                pending_force: force,
            });
            Vec3::ZERO
        } else {
            self.state.ground_pound = Some(GroundPoundPhase::Fall);
            events.publish_action(ActionEvent::GroundPoundPhase(GroundPoundPhase::Fall));
            force
        };

        self.execute(ActionCommand::new(ActionVariant::GroundPound, launch), ctx, events)
    }

    /// Button released: clear its latch.
    pub fn on_release(&mut self, button: InputButton) {
        match button {
            InputButton::Jump => {
                self.state.consumed.jump = false;
                self.state.buffered_until = None;
            }
            InputButton::Crouch => {
                self.state.consumed.crouch = false;
                self.state.crouch_pressed_at = None;
            }
            InputButton::Action => self.state.consumed.action = false,
            InputButton::Sprint => {}
        }
    }

    /// Advance timers. Returns the deferred ground-pound force once hang time
    /// ends, or a buffered jump executed on the landing tick.
    pub fn tick(&mut self, ctx: &ChainContext, events: &EventChannel) -> Option<ActionCommand> {
        let landed = ctx.grounded && !self.was_grounded;
        self.was_grounded = ctx.grounded;
        self.landed_from_ground_pound = false;

        if !ctx.skidding {
            self.state.skid_backflip_consumed = false;
        }

        if landed {
            if self.is_ground_pounding() {
                self.state.hang_time = None;
                self.end_ground_pound(GroundPoundPhase::Land, events);
                self.state.ground_pound_landed_at = Some(ctx.now);
                self.landed_from_ground_pound = true;
            }
            self.state.active_action = None;

            let buffered = self.state.buffered_until.take().is_some_and(|t| ctx.now <= t);
            if buffered && ctx.jump_held && !self.state.consumed.jump && self.interval_open(ctx.now) {
                let command = self.decide_jump(ctx);
                self.state.consumed.jump = true;
                trace!("buffered jump fired on landing");
                return self.execute(command, ctx, events);
            }
        }

        if let Some(hang) = self.state.hang_time {
            if ctx.now - hang.start >= hang.duration {
                self.state.hang_time = None;
                self.state.ground_pound = Some(GroundPoundPhase::Fall);
                events.publish_action(ActionEvent::GroundPoundPhase(GroundPoundPhase::Fall));
                return Some(ActionCommand::new(ActionVariant::GroundPound, hang.pending_force));
            }
        }

        if ctx.grounded
            && self.state.chain_counter > 0
            && ctx.now - ctx.landed_at >= self.settings.chain_window
        {
            trace!(counter = self.state.chain_counter, "jump chain window expired");
            self.state.chain_counter = 0;
        }

        if self
            .state
            .ground_pound_landed_at
            .is_some_and(|t| ctx.now - t > self.settings.ground_pound_jump_window)
        {
            self.state.ground_pound_landed_at = None;
        }

        if self.state.buffered_until.is_some_and(|t| ctx.now > t) {
            self.state.buffered_until = None;
        }

        None
    }

    fn end_ground_pound(&mut self, phase: GroundPoundPhase, events: &EventChannel) {
        self.state.ground_pound = Some(phase);
        self.state.hang_time = None;
        events.publish_action(ActionEvent::GroundPoundPhase(phase));
        self.state.ground_pound = None;
    }

    fn execute(
        &mut self,
        mut command: ActionCommand,
        ctx: &ChainContext,
        events: &EventChannel,
    ) -> Option<ActionCommand> {
        if !command.variant.is_chain() && command.variant != ActionVariant::LedgeClimb {
            self.state.chain_counter = 0;
        }
        command.chain_counter = self.state.chain_counter;
        self.state.last_action_time = ctx.now;
        self.state.active_action = Some(command.variant);
        self.state.buffered_until = None;
        if command.variant == ActionVariant::GroundPoundJump {
            self.state.ground_pound_landed_at = None;
        }

        if let Some(direction) = command.facing {
            events.publish_action(ActionEvent::RotatePlayer { direction });
        }
        events.publish_action(ActionEvent::JumpExecuted(command));
        debug!(
            variant = ?command.variant,
            animation = ?command.animation,
            counter = command.chain_counter,
            "action executed"
        );
        Some(command)
    }
}

fn direction_or(direction: Vec3, fallback: Vec3) -> Vec3 {
    let flat = Vec3::new(direction.x, 0.0, direction.z);
    flat.try_normalize()
        .or_else(|| Vec3::new(fallback.x, 0.0, fallback.z).try_normalize())
        .unwrap_or(Vec3::NEG_Z)
}
