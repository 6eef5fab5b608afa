use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a command was refused. Reported only to the issuing client; never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CommandError {
    #[error("target cell is a wall")]
    BlockedByWall,
    #[error("target cell is outside the map")]
    OutOfBounds,
    #[error("target cell is occupied by another participant")]
    BlockedByParticipant,
    #[error("command rate limit exceeded")]
    RateLimited,
    #[error("participant is dead")]
    Dead,
    #[error("participant is casting")]
    Casting,
    #[error("movement is locked to the dash direction")]
    WrongDashDirection,
    #[error("ability is on cooldown")]
    OnCooldown,
    #[error("participant is already dashing")]
    AlreadyDashing,
    #[error("participant is already casting")]
    AlreadyCasting,
    #[error("health is already full")]
    FullHealth,
    #[error("position was corrected by the server")]
    PositionCorrected,
}

/// Reason carried by `MoveRejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    BlockedByWall,
    BlockedByParticipant,
    RateLimited,
    PositionCorrected,
    /// Refused by state: dead, casting or wrong dash direction.
    Invalid,
}

impl From<CommandError> for RejectReason {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::BlockedByWall | CommandError::OutOfBounds => RejectReason::BlockedByWall,
            CommandError::BlockedByParticipant => RejectReason::BlockedByParticipant,
            CommandError::RateLimited => RejectReason::RateLimited,
            CommandError::PositionCorrected => RejectReason::PositionCorrected,
            _ => RejectReason::Invalid,
        }
    }
}
