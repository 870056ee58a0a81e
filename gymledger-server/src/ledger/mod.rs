//! Gamification ledger: point balances, quest progress and reward redemption.
//!
//! Every function here takes a borrowed [`SqliteConnection`] and expects to
//! run inside a transaction owned by the caller, so that an activity record,
//! the quest progress it causes and the points it pays out commit or roll
//! back together. [`crate::storage::Store`] opens those transactions.

pub mod activity;
pub mod attendance;
pub mod badges;
pub mod exchange;
pub mod points;
pub mod quests;

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use gymledger_shared::api::{CompletedQuestDto, QuestOutcomeDto};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or missing input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown member, quest, reward, goal or badge.
    #[error("{0} not found")]
    NotFound(String),

    #[error("insufficient balance: {required} points required, {available} available")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("reward {0} is out of stock")]
    OutOfStock(i32),

    #[error("already checked in today")]
    AlreadyCheckedInToday,

    #[error("activity already recorded for idempotency key {0:?}")]
    DuplicateActivity(String),

    #[error("badge {badge_id} already awarded to member {member_id}")]
    AlreadyAwarded { member_id: i32, badge_id: i32 },

    #[error("database error: {0}")]
    Database(#[from] DieselError),
}

impl LedgerError {
    /// Domain conflicts that the caller should surface as a rejected request.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientBalance { .. }
                | LedgerError::OutOfStock(_)
                | LedgerError::AlreadyCheckedInToday
                | LedgerError::DuplicateActivity(_)
                | LedgerError::AlreadyAwarded { .. }
        )
    }

    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        LedgerError::NotFound(what.to_string())
    }
}

pub(crate) fn is_unique_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

/// A quest whose completion was paid out during one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedQuest {
    pub quest_id: i32,
    pub name: String,
    pub points_reward: i64,
}

/// Result of advancing quests for a single activity event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestOutcome {
    pub completed_quests: Vec<CompletedQuest>,
    pub points_earned: i64,
}

impl QuestOutcome {
    pub fn completed_ids(&self) -> Vec<i32> {
        self.completed_quests.iter().map(|q| q.quest_id).collect()
    }
}

impl From<QuestOutcome> for QuestOutcomeDto {
    fn from(value: QuestOutcome) -> Self {
        QuestOutcomeDto {
            completed_quests: value
                .completed_quests
                .into_iter()
                .map(|q| CompletedQuestDto {
                    id: q.quest_id,
                    name: q.name,
                    points_reward: q.points_reward,
                })
                .collect(),
            points_earned: value.points_earned,
        }
    }
}
