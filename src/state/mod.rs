//! State module for tracking session health
//!
//! `SessionState` is the health state machine every rendering session walks
//! through when its browser crashes and is replaced.

mod session_state;

pub use session_state::SessionState;
