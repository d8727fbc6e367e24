//! Session state, split by domain: the event reducer (`session`), the
//! activity sub-model (`activity`), and the leveling calculator (`level`).

pub mod activity;
pub mod level;
pub mod session;

pub use activity::{Activity, ActivityMode, ParticipantRef, SubmissionStatus, SubmitError};
pub use level::{LevelInfo, derive_level};
pub use session::{ConnectionStatus, Effect, SessionMessage, SessionState, SlideState};
