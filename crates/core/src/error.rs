//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid address format.
    #[error("Invalid address format: {0}")]
    InvalidAddress(String),

    /// Unknown transaction type.
    #[error("Unknown transaction type: {0}")]
    UnknownTransactionKind(String),

    /// Unknown transaction status.
    #[error("Unknown transaction status: {0}")]
    UnknownTransactionStatus(String),

    /// Unknown reward type.
    #[error("Unknown reward type: {0}")]
    UnknownRewardType(String),

    /// Unknown course difficulty.
    #[error("Unknown course difficulty: {0} (expected Beginner, Intermediate or Advanced)")]
    UnknownDifficulty(String),

    /// Unknown consumer data source.
    #[error("Unknown data source: {0} (expected github, uber or amazon)")]
    UnknownDataSource(String),

    /// Unknown repository or commit review status.
    #[error("Unknown review status: {0}")]
    UnknownStatus(String),

    /// Invalid decimal token amount.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid hex encoding.
    #[error("Invalid hex encoding")]
    InvalidHex,

    /// Signature could not be parsed or recovered.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Canonical JSON encoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Learning-progress state machine violation.
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// Violations of the learning-progress state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgressError {
    /// A course must contain at least one module.
    #[error("Course must have at least one module")]
    NoModules,

    /// The module id is outside the course.
    #[error("Module not found: {0}")]
    ModuleNotFound(u32),

    /// The previous module has not been completed yet.
    #[error("Module {0} is not unlocked yet")]
    ModuleLocked(u32),

    /// The module was completed earlier.
    #[error("Module {0} already completed")]
    ModuleAlreadyCompleted(u32),

    /// A reward has already been claimed for the module.
    #[error("Reward for module {0} already claimed")]
    RewardAlreadyClaimed(u32),

    /// No pending reward claim exists for the module.
    #[error("No pending reward claim for module {0}")]
    RewardNotClaimed(u32),

    /// The assignment has never been submitted.
    #[error("Assignment {0} has not been submitted")]
    AssignmentNotSubmitted(String),

    /// Not every module is complete.
    #[error("Course not finished: {completed} of {total} modules completed")]
    ModulesIncomplete {
        /// Completed modules.
        completed: u32,
        /// Total modules.
        total: u32,
    },

    /// The course was already marked complete.
    #[error("Course already completed")]
    CourseAlreadyCompleted,

    /// Refund requested before the course was completed.
    #[error("Course must be completed before the stake is returned")]
    CourseNotCompleted,

    /// The stake was already returned.
    #[error("Stake already returned")]
    StakeAlreadyReturned,

    /// The learner never staked for the course.
    #[error("Course was not staked")]
    NotStaked,

    /// The learner already staked for the course.
    #[error("Course already staked")]
    AlreadyStaked,

    /// The difficulty reward for the course was already paid.
    #[error("Completion reward already claimed")]
    CompletionRewardClaimed,
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
