use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category of member activity a quest counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Attendance,
    Exercise,
    Diet,
    Goal,
    Social,
}

impl ActivityType {
    pub const ALL: [ActivityType; 5] = [
        ActivityType::Attendance,
        ActivityType::Exercise,
        ActivityType::Diet,
        ActivityType::Goal,
        ActivityType::Social,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Attendance => "ATTENDANCE",
            ActivityType::Exercise => "EXERCISE",
            ActivityType::Diet => "DIET",
            ActivityType::Goal => "GOAL",
            ActivityType::Social => "SOCIAL",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl FromStr for ActivityType {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityType::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseEnumError {
                kind: "activity type",
                value: s.to_string(),
            })
    }
}

/// Why a member's balance moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerSource {
    QuestCompletion,
    AttendanceBonus,
    ManualGrant,
    Redemption,
}

impl LedgerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerSource::QuestCompletion => "QUEST_COMPLETION",
            LedgerSource::AttendanceBonus => "ATTENDANCE_BONUS",
            LedgerSource::ManualGrant => "MANUAL_GRANT",
            LedgerSource::Redemption => "REDEMPTION",
        }
    }
}

impl fmt::Display for LedgerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerSource {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEST_COMPLETION" => Ok(LedgerSource::QuestCompletion),
            "ATTENDANCE_BONUS" => Ok(LedgerSource::AttendanceBonus),
            "MANUAL_GRANT" => Ok(LedgerSource::ManualGrant),
            "REDEMPTION" => Ok(LedgerSource::Redemption),
            other => Err(ParseEnumError {
                kind: "ledger source",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Mentor,
    Mentee,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Mentor => "mentor",
            PostKind::Mentee => "mentee",
        }
    }
}

// Catalog entries as they appear in the server config file.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: i32,
    pub name: String,
    pub quest_type: ActivityType,
    pub target_value: i32,
    pub points_reward: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: i32,
    pub name: String,
    pub required_points: i64,
    pub stock_quantity: i64,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Badge {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}
