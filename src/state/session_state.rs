/// Health states of a rendering session
///
/// A session starts `Healthy`. A crash, a closed page or a failed health
/// probe moves it to `Unhealthy`; the next navigation attempt moves it to
/// `Recreating` while a fresh browser is launched, and back to `Healthy`
/// once the replacement is in place.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The underlying page answered its last probe
    Healthy,

    /// The underlying page crashed, closed or failed a probe
    Unhealthy,

    /// A replacement browser is being launched
    Recreating,
}

impl SessionState {
    /// Returns true if the session can be used without recreation
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Returns true if the next navigation attempt must recreate the session
    pub fn needs_recreation(&self) -> bool {
        !self.is_healthy()
    }

    /// Returns true if moving to `next` is a legal transition
    ///
    /// A failed recreation leaves the session `Unhealthy`, so
    /// `Recreating -> Unhealthy` is legal as well.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Healthy, Self::Unhealthy)
                | (Self::Unhealthy, Self::Recreating)
                | (Self::Recreating, Self::Healthy)
                | (Self::Recreating, Self::Unhealthy)
        ) || *self == next
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Recreating => "recreating",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
