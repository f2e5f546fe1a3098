//! Start delivery across the interceptor's readiness signal.
//!
//! A start requested before the interceptor announced itself is remembered
//! and delivered once, when readiness arrives. A start is delivered at most
//! once per active period.

use crate::page::ControlAction;

/// Relay-side view of the control handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Handshake {
    ready: bool,
    wants_active: bool,
    start_delivered: bool,
}

impl Handshake {
    /// Creates a handshake for a page that has not announced readiness.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handshake for a page whose interceptor is already listening.
    #[must_use]
    pub fn ready() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// Returns `true` once readiness was observed.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns `true` if capture is wanted.
    #[inline]
    #[must_use]
    pub fn wants_active(&self) -> bool {
        self.wants_active
    }

    /// Records a start request. Returns the action to post now, if any.
    pub fn request_start(&mut self) -> Option<ControlAction> {
        self.wants_active = true;
        self.deliver_start()
    }

    /// Records a stop request. Returns the action to post now, if any.
    pub fn request_stop(&mut self) -> Option<ControlAction> {
        self.wants_active = false;
        self.start_delivered = false;
        self.ready.then_some(ControlAction::Stop)
    }

    /// Records readiness. Returns a deferred start, if one is owed.
    pub fn on_ready(&mut self) -> Option<ControlAction> {
        self.ready = true;
        self.deliver_start()
    }

    fn deliver_start(&mut self) -> Option<ControlAction> {
        if self.ready && self.wants_active && !self.start_delivered {
            self.start_delivered = true;
            Some(ControlAction::Start)
        } else {
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Start,
        Stop,
        Ready,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![Just(Step::Start), Just(Step::Stop), Just(Step::Ready)]
    }

    fn apply(handshake: &mut Handshake, step: Step) -> Option<ControlAction> {
        match step {
            Step::Start => handshake.request_start(),
            Step::Stop => handshake.request_stop(),
            Step::Ready => handshake.on_ready(),
        }
    }

    #[test]
    fn test_two_starts_before_ready_deliver_one() {
        let mut handshake = Handshake::new();
        assert_eq!(handshake.request_start(), None);
        assert_eq!(handshake.request_start(), None);
        assert_eq!(handshake.on_ready(), Some(ControlAction::Start));
        assert_eq!(handshake.on_ready(), None);
    }

    #[test]
    fn test_start_after_ready_is_immediate() {
        let mut handshake = Handshake::ready();
        assert_eq!(handshake.request_start(), Some(ControlAction::Start));
        assert_eq!(handshake.request_start(), None);
    }

    #[test]
    fn test_stop_before_ready_cancels_start() {
        let mut handshake = Handshake::new();
        handshake.request_start();
        assert_eq!(handshake.request_stop(), None);
        assert_eq!(handshake.on_ready(), None);
        assert!(!handshake.wants_active());
    }

    #[test]
    fn test_restart_after_stop() {
        let mut handshake = Handshake::ready();
        handshake.request_start();
        assert_eq!(handshake.request_stop(), Some(ControlAction::Stop));
        assert_eq!(handshake.request_start(), Some(ControlAction::Start));
    }

    proptest! {
        #[test]
        fn prop_starts_never_repeat_within_an_active_period(
            steps in prop::collection::vec(step(), 0..48)
        ) {
            let mut handshake = Handshake::new();
            let mut delivered_since_stop = 0;
            for step in steps {
                match apply(&mut handshake, step) {
                    Some(ControlAction::Start) => delivered_since_stop += 1,
                    Some(ControlAction::Stop) => delivered_since_stop = 0,
                    None => {}
                }
                if matches!(step, Step::Stop) {
                    delivered_since_stop = 0;
                }
                prop_assert!(delivered_since_stop <= 1);
            }
        }

        #[test]
        fn prop_pending_start_delivered_on_ready(
            starts in 1usize..8
        ) {
            let mut handshake = Handshake::new();
            for _ in 0..starts {
                prop_assert_eq!(handshake.request_start(), None);
            }
            prop_assert_eq!(handshake.on_ready(), Some(ControlAction::Start));
        }
    }
}
