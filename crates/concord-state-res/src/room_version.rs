use crate::event_auth::{AuthRules, AuthRulesV1};

/// Named rule-set selector, per spec §9's open question ("design the
/// authorization engine as a trait parameterised by a rule-set object even
/// if only one is provided initially"). Only `V1` ships a rule-set; later
/// versions are a hook, not an implemented feature (spec Non-goals exclude
/// per-room-version idiosyncrasies beyond this one).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum RoomVersion {
    V1,
}

impl RoomVersion {
    /// The authorization rule-set in force for this room version.
    pub fn rules(self) -> &'static dyn AuthRules {
        match self {
            Self::V1 => &AuthRulesV1,
        }
    }
}

impl Default for RoomVersion {
    fn default() -> Self {
        Self::V1
    }
}
