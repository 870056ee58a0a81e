use serde::{Deserialize, Serialize};

use crate::domain::{ActivityType, LedgerSource, PostKind};

pub mod endpoints;

pub const API_V1_PREFIX: &str = "/api/v1";

/// Header carrying a client-chosen key that makes an activity submission
/// safe to retry.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

// Points
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceDto {
    pub member_id: i32,
    pub total_points: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerEntryDto {
    pub id: i32,
    pub amount: i64,
    pub source: LedgerSource,
    pub description: Option<String>,
    pub balance_after: i64,
    pub time: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GrantPointsReq {
    pub points: i64,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GrantPointsResp {
    pub ledger_entry_id: i32,
    pub total_points: i64,
}

// Quests
#[derive(Debug, Serialize, Deserialize)]
pub struct QuestDto {
    pub id: i32,
    pub name: String,
    pub quest_type: ActivityType,
    pub target_value: i32,
    pub points_reward: i64,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestProgressDto {
    pub id: i32,
    pub name: String,
    pub quest_type: ActivityType,
    pub target_value: i32,
    pub points_reward: i64,
    pub current_progress: i32,
    pub is_completed: bool,
    pub completed_at: Option<String>, // RFC3339 UTC
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatusFilter {
    Available,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedQuestDto {
    pub id: i32,
    pub name: String,
    pub points_reward: i64,
}

/// Ledger effect of one activity event, included in every activity response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuestOutcomeDto {
    pub completed_quests: Vec<CompletedQuestDto>,
    pub points_earned: i64,
}

// Activities
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckInResp {
    pub attendance_id: i32,
    pub bonus_points: i64,
    pub points_earned: i64,
    pub completed_quests: Vec<CompletedQuestDto>,
    pub total_points: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttendanceDto {
    pub id: i32,
    pub attended_on: String, // YYYY-MM-DD in the gym's timezone
    pub attended_at: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExerciseLogReq {
    pub exercise_name: String,
    pub duration_minutes: Option<i32>,
    pub performed_at: Option<String>, // RFC3339
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DietLogReq {
    pub food_name: String,
    pub meal_type: Option<String>,
    pub ate_at: Option<String>, // RFC3339
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GoalReq {
    pub item_name: String,
    pub target_date: String, // YYYY-MM-DD
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostReq {
    pub kind: PostKind,
    pub title: String,
    pub body: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityResp {
    /// Id of the persisted domain record (log, goal or post).
    pub record_id: i32,
    pub points_earned: i64,
    pub completed_quests: Vec<CompletedQuestDto>,
    pub total_points: i64,
}

// Rewards
#[derive(Debug, Serialize, Deserialize)]
pub struct RewardDto {
    pub id: i32,
    pub name: String,
    pub required_points: i64,
    pub stock_quantity: i64,
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRewardReq {
    pub name: String,
    pub required_points: i64,
    pub stock_quantity: i64,
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestockReq {
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemResp {
    pub exchange_id: i32,
    pub reward_id: i32,
    pub reward_name: String,
    pub used_points: i64,
    pub total_points: i64,
    pub time: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExchangeHistoryItemDto {
    pub exchange_id: i32,
    pub reward_id: i32,
    pub reward_name: String,
    pub used_points: i64,
    pub time: String, // RFC3339 UTC
}

// Badges
#[derive(Debug, Serialize, Deserialize)]
pub struct BadgeDto {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberBadgeDto {
    pub badge_id: i32,
    pub name: String,
    pub earned_at: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GrantBadgeReq {
    pub badge_id: i32,
}

/// Error payload returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(default)]
    pub retryable: bool,
}
