pub mod badges;
pub mod domain;
pub mod feedback;
pub mod journal;
pub mod memory;
pub mod ports;
pub mod progress;
pub mod reconcile;
pub mod streak;
pub mod themes;

pub use domain::{
    AuthSession, Badge, BadgeId, Feedback, Poem, PoemDraft, ResetTicket, StreakRecord, Tally,
    Theme, User, UserCredentials,
};
pub use journal::{Journal, JournalError, JournalResult};
pub use ports::{
    AuthService, CloudStatus, FeedbackService, LocalStore, PoemRepository, PortError, PortResult,
    ResetLinkError,
};
