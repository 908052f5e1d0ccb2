use thiserror::Error;

/// A rejected player request.
///
/// Rejections are returned synchronously to the caller as structured
/// failures; they never escape a coordinator as a panic and never abort a
/// background tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("unknown player: {0}")]
    UnknownPlayer(String),

    #[error("daily arena match limit reached ({limit}/{limit})")]
    DailyLimitReached { limit: u32 },

    #[error("already waiting in the arena queue")]
    AlreadyQueued,

    #[error("already fighting in an active match")]
    AlreadyInMatch,

    #[error("match is not available")]
    MatchUnavailable,

    #[error("instance is not available")]
    InstanceUnavailable,

    #[error("instance is full")]
    InstanceFull,

    #[error("requires at least level {required}")]
    LevelTooLow { required: u32 },
}

pub type Result<T> = std::result::Result<T, Rejection>;
