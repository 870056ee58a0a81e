use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use gymledger_shared::domain::{ActivityType, LedgerSource};
use tracing::info;

use super::{LedgerError, QuestOutcome, activity, is_unique_violation, points, quests};
use crate::storage::models::NewAttendance;
use crate::storage::schema::attendance;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub attendance_id: i32,
    pub bonus_points: i64,
    pub quest: QuestOutcome,
    pub total_points: i64,
}

impl CheckIn {
    /// Flat bonus plus whatever attendance quests paid out.
    pub fn points_earned(&self) -> i64 {
        self.bonus_points + self.quest.points_earned
    }
}

/// Records the member's attendance for `today`, credits the flat bonus and
/// advances attendance quests.
///
/// The same-day check and the insert share the caller's transaction; the
/// unique `(member_id, attended_on)` index backs it up if two check-ins race.
pub fn check_in(
    conn: &mut SqliteConnection,
    member_id: i32,
    today: NaiveDate,
    bonus: i64,
) -> Result<CheckIn, LedgerError> {
    points::ensure_member(conn, member_id)?;

    let already: i64 = attendance::table
        .filter(attendance::member_id.eq(member_id))
        .filter(attendance::attended_on.eq(today))
        .count()
        .get_result(conn)?;
    if already > 0 {
        return Err(LedgerError::AlreadyCheckedInToday);
    }

    let attendance_id = diesel::insert_into(attendance::table)
        .values(&NewAttendance {
            member_id,
            attended_on: today,
            attended_at: Utc::now().naive_utc(),
        })
        .returning(attendance::id)
        .get_result::<i32>(conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::AlreadyCheckedInToday
            } else {
                LedgerError::Database(e)
            }
        })?;

    activity::record_event(conn, member_id, ActivityType::Attendance, None)?;
    points::credit(
        conn,
        member_id,
        bonus,
        LedgerSource::AttendanceBonus,
        Some("daily check-in"),
    )?;
    let quest = quests::evaluate(conn, member_id, ActivityType::Attendance)?;
    let total_points = points::balance(conn, member_id)?;
    info!(
        member_id,
        attendance_id,
        %today,
        bonus,
        quest_points = quest.points_earned,
        total_points,
        "attendance: checked in"
    );
    Ok(CheckIn {
        attendance_id,
        bonus_points: bonus,
        quest,
        total_points,
    })
}
