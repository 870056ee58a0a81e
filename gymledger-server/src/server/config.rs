use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use gymledger_shared::domain::{Badge, Member, Quest, Reward};
use serde::Deserialize;
use std::{env, fs, path::Path};

pub use gymledger_shared::auth::Role;

const DEFAULT_ATTENDANCE_BONUS: i64 = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub quests: Vec<Quest>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    /// IANA zone that defines the gym's calendar day for check-ins.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_attendance_bonus")]
    pub attendance_bonus: i64,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_attendance_bonus() -> i64 {
    DEFAULT_ATTENDANCE_BONUS
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password_hash: String, // bcrypt hash
    pub role: Role,
    pub member_id: Option<i32>, // required when role == member
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.jwt_secret.trim().is_empty() {
            return invalid("jwt_secret must not be empty".into());
        }
        self.tz()?;
        if self.attendance_bonus < 0 {
            return invalid("attendance_bonus must not be negative".into());
        }
        for q in &self.quests {
            if q.target_value <= 0 {
                return invalid(format!("quest {}: target_value must be positive", q.id));
            }
            if q.points_reward < 0 {
                return invalid(format!("quest {}: points_reward must not be negative", q.id));
            }
        }
        for r in &self.rewards {
            if r.required_points <= 0 {
                return invalid(format!("reward {}: required_points must be positive", r.id));
            }
            if r.stock_quantity < 0 {
                return invalid(format!("reward {}: stock_quantity must not be negative", r.id));
            }
        }
        for u in &self.users {
            match (u.role, u.member_id) {
                (Role::Member, None) => {
                    return invalid(format!("user {}: member users need member_id", u.username));
                }
                (Role::Member, Some(id)) if !self.members.iter().any(|m| m.id == id) => {
                    return invalid(format!(
                        "user {}: member {} is not configured",
                        u.username, id
                    ));
                }
                (Role::Staff, Some(_)) => {
                    return invalid(format!(
                        "user {}: staff users must not have member_id",
                        u.username
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::Invalid(format!("timezone {}: {}", self.timezone, e)))
    }

    /// Calendar date "now" in the gym's timezone.
    pub fn today(&self) -> Result<NaiveDate, ConfigError> {
        Ok(Utc::now().with_timezone(&self.tz()?).date_naive())
    }
}
