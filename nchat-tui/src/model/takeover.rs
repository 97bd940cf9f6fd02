//! Protocol UI takeover arbitration (`SPEC_FULL.md` §4.3.3, §9, Scenario E).
//!
//! The original's 50ms spin-with-yield loop is replaced with a plain flag on
//! [`ModelState`](super::state::ModelState) that `crate::app::run`'s render
//! loop polls each frame via [`crate::model::Model::takeover_active`],
//! suspending redraw and key routing for as long as it is set; this module
//! is the pure arbitration logic — which profile currently owns the
//! terminal, and whether a new take request is granted or denied — kept
//! separate from that polling so it is testable without an async runtime.
use nchat_core::ProfileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeoverOutcome {
    Granted,
    Denied,
    Released,
    /// An `end` from a profile that did not hold control; ignored.
    Ignored,
}

#[derive(Debug, Default)]
pub struct TakeoverState {
    owner: Option<ProfileId>,
}

impl TakeoverState {
    pub fn new() -> Self {
        Self { owner: None }
    }

    pub fn is_active(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<&ProfileId> {
        self.owner.as_ref()
    }

    /// Invariant 4: at most one backend owns `ProtocolUiControl` at any
    /// instant.
    pub fn request(&mut self, profile_id: &ProfileId, take_control: bool) -> TakeoverOutcome {
        if take_control {
            match &self.owner {
                None => {
                    self.owner = Some(profile_id.clone());
                    TakeoverOutcome::Granted
                }
                Some(owner) if owner == profile_id => TakeoverOutcome::Granted,
                Some(_) => TakeoverOutcome::Denied,
            }
        } else {
            match &self.owner {
                Some(owner) if owner == profile_id => {
                    self.owner = None;
                    TakeoverOutcome::Released
                }
                _ => TakeoverOutcome::Ignored,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_e_takeover_and_release() {
        let mut state = TakeoverState::new();
        let p1 = ProfileId::new("p1");
        let p2 = ProfileId::new("p2");

        assert_eq!(state.request(&p1, true), TakeoverOutcome::Granted);
        assert!(state.is_active());

        // A concurrent take attempt from p2 is denied without disturbing p1.
        assert_eq!(state.request(&p2, true), TakeoverOutcome::Denied);
        assert_eq!(state.owner(), Some(&p1));

        assert_eq!(state.request(&p1, false), TakeoverOutcome::Released);
        assert!(!state.is_active());
    }

    #[test]
    fn release_from_non_owner_is_ignored() {
        let mut state = TakeoverState::new();
        let p1 = ProfileId::new("p1");
        let p2 = ProfileId::new("p2");
        state.request(&p1, true);
        assert_eq!(state.request(&p2, false), TakeoverOutcome::Ignored);
        assert!(state.is_active());
    }

    #[test]
    fn re_requesting_take_while_already_owner_stays_granted() {
        let mut state = TakeoverState::new();
        let p1 = ProfileId::new("p1");
        assert_eq!(state.request(&p1, true), TakeoverOutcome::Granted);
        assert_eq!(state.request(&p1, true), TakeoverOutcome::Granted);
    }
}
