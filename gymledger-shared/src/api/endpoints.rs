use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_V1_PREFIX;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn me(base: &str, suffix: &str) -> String {
    base_join(base, &format!("{}/me/{}", API_V1_PREFIX, suffix))
}

fn admin(base: &str, suffix: &str) -> String {
    base_join(base, &format!("{}/admin/{}", API_V1_PREFIX, suffix))
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}

// Catalog
pub fn quests(base: &str) -> String {
    base_join(base, &format!("{}/quests", API_V1_PREFIX))
}
pub fn rewards(base: &str) -> String {
    base_join(base, &format!("{}/rewards", API_V1_PREFIX))
}
pub fn reward(base: &str, reward_id: i32) -> String {
    base_join(base, &format!("{}/rewards/{}", API_V1_PREFIX, reward_id))
}
pub fn badges(base: &str) -> String {
    base_join(base, &format!("{}/badges", API_V1_PREFIX))
}

// Authenticated member
pub fn my_points(base: &str) -> String {
    me(base, "points")
}
pub fn my_ledger(base: &str) -> String {
    me(base, "ledger")
}
pub fn my_quests(base: &str) -> String {
    me(base, "quests")
}
/// Quest board filtered by activity type and/or status (`available`, `completed`).
pub fn my_quests_filtered(base: &str, quest_type: Option<&str>, status: Option<&str>) -> String {
    let mut query = Vec::new();
    if let Some(t) = quest_type {
        query.push(format!("type={}", enc(t)));
    }
    if let Some(s) = status {
        query.push(format!("status={}", enc(s)));
    }
    if query.is_empty() {
        my_quests(base)
    } else {
        format!("{}?{}", my_quests(base), query.join("&"))
    }
}
pub fn my_check_in(base: &str) -> String {
    me(base, "attendance/check-in")
}
pub fn my_attendance(base: &str) -> String {
    me(base, "attendance")
}
/// Attendance on one gym day, `YYYY-MM-DD`.
pub fn my_attendance_on(base: &str, date: &str) -> String {
    format!("{}?date={}", my_attendance(base), enc(date))
}
pub fn my_exercises(base: &str) -> String {
    me(base, "exercises")
}
pub fn my_diet(base: &str) -> String {
    me(base, "diet")
}
pub fn my_goals(base: &str) -> String {
    me(base, "goals")
}
pub fn my_goal_achieve(base: &str, goal_id: i32) -> String {
    me(base, &format!("goals/{}/achieve", goal_id))
}
pub fn my_posts(base: &str) -> String {
    me(base, "posts")
}
pub fn my_redeem(base: &str, reward_id: i32) -> String {
    me(base, &format!("rewards/{}/redeem", reward_id))
}
pub fn my_exchanges(base: &str) -> String {
    me(base, "exchanges")
}
pub fn my_badges(base: &str) -> String {
    me(base, "badges")
}

// Staff
pub fn member_points(base: &str, member_id: i32) -> String {
    admin(base, &format!("members/{}/points", member_id))
}
pub fn member_badges(base: &str, member_id: i32) -> String {
    admin(base, &format!("members/{}/badges", member_id))
}
pub fn admin_rewards(base: &str) -> String {
    admin(base, "rewards")
}
pub fn reward_restock(base: &str, reward_id: i32) -> String {
    admin(base, &format!("rewards/{}/restock", reward_id))
}
