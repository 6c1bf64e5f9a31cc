//! Press / hold / release disambiguation for the stepping controls.
//!
//! Each hold-capable control runs a tiny state machine. A press that is
//! released before the hold threshold elapses is a tap and performs a
//! discrete step; a press that outlives the threshold starts slow-motion
//! playback, and releasing it pauses on the spot. The host feeds in discrete
//! events (it owns the timer that produces [`GestureEvent::HoldThresholdElapsed`]);
//! [`advance`] is a pure function of `(state, event)`.
//!
//! ```text
//! Idle --Down--> Pressed --Up--> Idle                (Step)
//!                Pressed --HoldThresholdElapsed--> HeldActive  (BeginHold)
//!                                    HeldActive --Up--> Idle   (EndHold)
//! ```

/// The two independently tracked hold zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoldZone {
    /// The coarse control: a tap jumps the large-step frame count.
    LargeStep,
    /// The fine control: a tap steps one frame.
    SmallStep,
}

impl HoldZone {
    /// Both zones, in index order.
    pub const ALL: [HoldZone; 2] = [HoldZone::LargeStep, HoldZone::SmallStep];

    pub(crate) fn index(self) -> usize {
        match self {
            HoldZone::LargeStep => 0,
            HoldZone::SmallStep => 1,
        }
    }
}

/// Direction of a frame step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    /// Towards the start of the media.
    Backward,
    /// Towards the end of the media.
    Forward,
}

impl StepDirection {
    /// `-1` or `1`.
    pub fn signum(self) -> i64 {
        match self {
            StepDirection::Backward => -1,
            StepDirection::Forward => 1,
        }
    }
}

/// Per-control gesture state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldGestureState {
    /// Not touched.
    #[default]
    Idle,
    /// Down, hold threshold not yet reached.
    Pressed,
    /// Held past the threshold; slow-motion playback is running.
    HeldActive,
}

/// Discrete input events for one control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    /// Pointer went down on the control.
    Down,
    /// The host's long-press timer fired while still down.
    HoldThresholdElapsed,
    /// Pointer went up (or left the control).
    Up,
}

/// What the controller should do in response to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureAction {
    /// Nothing.
    None,
    /// Tapped and released: perform the discrete step.
    Step,
    /// Hold recognised: start slow-motion playback.
    BeginHold,
    /// Released from hold: pause immediately.
    EndHold,
}

/// Advance one control's state machine.
///
/// Events that make no sense in the current state (a second `Down`, an `Up`
/// while idle, a late threshold after release) leave the state unchanged and
/// produce [`GestureAction::None`].
///
/// # Example
///
/// ```
/// use framestep::{GestureAction, GestureEvent, HoldGestureState, gesture::advance};
///
/// let (state, action) = advance(HoldGestureState::Idle, GestureEvent::Down);
/// assert_eq!(action, GestureAction::None);
/// let (state, action) = advance(state, GestureEvent::Up);
/// assert_eq!((state, action), (HoldGestureState::Idle, GestureAction::Step));
/// ```
pub fn advance(
    state: HoldGestureState,
    event: GestureEvent,
) -> (HoldGestureState, GestureAction) {
    use GestureAction as A;
    use GestureEvent as E;
    use HoldGestureState as S;

    match (state, event) {
        (S::Idle, E::Down) => (S::Pressed, A::None),
        (S::Pressed, E::Up) => (S::Idle, A::Step),
        (S::Pressed, E::HoldThresholdElapsed) => (S::HeldActive, A::BeginHold),
        (S::HeldActive, E::Up) => (S::Idle, A::EndHold),
        (state, _) => (state, A::None),
    }
}
