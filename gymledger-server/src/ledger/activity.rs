//! Activity entry points. Each persists its own domain record and then runs
//! quest evaluation in the same transaction.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use gymledger_shared::domain::{ActivityType, PostKind};
use tracing::{debug, info};

use super::{LedgerError, QuestOutcome, is_unique_violation, points, quests};
use crate::storage::models::{
    Goal, NewActivityEvent, NewDietLog, NewExerciseLog, NewGoal, NewPost,
};
use crate::storage::schema::{activity_events, diet_logs, exercise_logs, goals, posts};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityOutcome {
    pub record_id: i32,
    pub quest: QuestOutcome,
    pub total_points: i64,
}

/// Appends an activity event. With an idempotency key, a second event
/// carrying the same key for the same member fails with
/// [`LedgerError::DuplicateActivity`] and aborts the transaction.
pub fn record_event(
    conn: &mut SqliteConnection,
    member_id: i32,
    activity: ActivityType,
    idempotency_key: Option<&str>,
) -> Result<(), LedgerError> {
    let inserted = diesel::insert_into(activity_events::table)
        .values(&NewActivityEvent {
            member_id,
            activity_type: activity.as_str(),
            idempotency_key,
            created_at: Utc::now().naive_utc(),
        })
        .execute(conn);
    match inserted {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => {
            let key = idempotency_key.unwrap_or_default().to_string();
            debug!(member_id, %activity, key = %key, "activity: duplicate event");
            Err(LedgerError::DuplicateActivity(key))
        }
        Err(e) => Err(e.into()),
    }
}

/// Fails with [`LedgerError::DuplicateActivity`] when the member already used
/// `idempotency_key`, without recording anything.
fn ensure_fresh_key(
    conn: &mut SqliteConnection,
    member_id: i32,
    idempotency_key: Option<&str>,
) -> Result<(), LedgerError> {
    let Some(key) = idempotency_key else {
        return Ok(());
    };
    let seen: i64 = activity_events::table
        .filter(activity_events::member_id.eq(member_id))
        .filter(activity_events::idempotency_key.eq(key))
        .count()
        .get_result(conn)?;
    if seen > 0 {
        debug!(member_id, key = %key, "activity: duplicate event");
        return Err(LedgerError::DuplicateActivity(key.to_string()));
    }
    Ok(())
}

fn required(field: &str, value: &str) -> Result<(), LedgerError> {
    if value.trim().is_empty() {
        Err(LedgerError::Validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

fn finish(
    conn: &mut SqliteConnection,
    member_id: i32,
    activity: ActivityType,
    record_id: i32,
) -> Result<ActivityOutcome, LedgerError> {
    let quest = quests::evaluate(conn, member_id, activity)?;
    let total_points = points::balance(conn, member_id)?;
    info!(
        member_id,
        %activity,
        record_id,
        points_earned = quest.points_earned,
        completed = quest.completed_quests.len(),
        "activity: recorded"
    );
    Ok(ActivityOutcome {
        record_id,
        quest,
        total_points,
    })
}

pub fn log_exercise(
    conn: &mut SqliteConnection,
    member_id: i32,
    exercise_name: &str,
    duration_minutes: Option<i32>,
    performed_at: Option<NaiveDateTime>,
    idempotency_key: Option<&str>,
) -> Result<ActivityOutcome, LedgerError> {
    required("exercise_name", exercise_name)?;
    if duration_minutes.is_some_and(|m| m < 0) {
        return Err(LedgerError::Validation(
            "duration_minutes must not be negative".into(),
        ));
    }
    points::ensure_member(conn, member_id)?;
    record_event(conn, member_id, ActivityType::Exercise, idempotency_key)?;
    let record_id = diesel::insert_into(exercise_logs::table)
        .values(&NewExerciseLog {
            member_id,
            exercise_name: exercise_name.trim(),
            duration_minutes,
            performed_at: performed_at.unwrap_or_else(|| Utc::now().naive_utc()),
        })
        .returning(exercise_logs::id)
        .get_result::<i32>(conn)?;
    finish(conn, member_id, ActivityType::Exercise, record_id)
}

pub fn log_diet(
    conn: &mut SqliteConnection,
    member_id: i32,
    food_name: &str,
    meal_type: Option<&str>,
    ate_at: Option<NaiveDateTime>,
    idempotency_key: Option<&str>,
) -> Result<ActivityOutcome, LedgerError> {
    required("food_name", food_name)?;
    points::ensure_member(conn, member_id)?;
    record_event(conn, member_id, ActivityType::Diet, idempotency_key)?;
    let record_id = diesel::insert_into(diet_logs::table)
        .values(&NewDietLog {
            member_id,
            food_name: food_name.trim(),
            meal_type,
            ate_at: ate_at.unwrap_or_else(|| Utc::now().naive_utc()),
        })
        .returning(diet_logs::id)
        .get_result::<i32>(conn)?;
    finish(conn, member_id, ActivityType::Diet, record_id)
}

/// Creating a goal is not an activity; only achieving one is.
pub fn create_goal(
    conn: &mut SqliteConnection,
    member_id: i32,
    item_name: &str,
    target_date: NaiveDate,
) -> Result<Goal, LedgerError> {
    required("item_name", item_name)?;
    points::ensure_member(conn, member_id)?;
    Ok(diesel::insert_into(goals::table)
        .values(&NewGoal {
            member_id,
            item_name: item_name.trim(),
            target_date,
            created_at: Utc::now().naive_utc(),
        })
        .returning(Goal::as_returning())
        .get_result::<Goal>(conn)?)
}

/// Marks the member's goal achieved. Only the first transition counts as a
/// GOAL activity; achieving an achieved goal again changes nothing. A reused
/// idempotency key is rejected before the goal is looked at.
pub fn achieve_goal(
    conn: &mut SqliteConnection,
    member_id: i32,
    goal_id: i32,
    idempotency_key: Option<&str>,
) -> Result<ActivityOutcome, LedgerError> {
    let owned: i64 = goals::table
        .filter(goals::id.eq(goal_id))
        .filter(goals::member_id.eq(member_id))
        .count()
        .get_result(conn)?;
    if owned == 0 {
        return Err(LedgerError::not_found(format_args!("goal {goal_id}")));
    }
    ensure_fresh_key(conn, member_id, idempotency_key)?;

    let flipped = diesel::update(
        goals::table
            .find(goal_id)
            .filter(goals::is_achieved.eq(false)),
    )
    .set(goals::is_achieved.eq(true))
    .execute(conn)?;
    if flipped == 0 {
        debug!(member_id, goal_id, "activity: goal already achieved");
        return Ok(ActivityOutcome {
            record_id: goal_id,
            quest: QuestOutcome::default(),
            total_points: points::balance(conn, member_id)?,
        });
    }
    record_event(conn, member_id, ActivityType::Goal, idempotency_key)?;
    finish(conn, member_id, ActivityType::Goal, goal_id)
}

pub fn create_post(
    conn: &mut SqliteConnection,
    member_id: i32,
    kind: PostKind,
    title: &str,
    body: Option<&str>,
    idempotency_key: Option<&str>,
) -> Result<ActivityOutcome, LedgerError> {
    required("title", title)?;
    points::ensure_member(conn, member_id)?;
    record_event(conn, member_id, ActivityType::Social, idempotency_key)?;
    let record_id = diesel::insert_into(posts::table)
        .values(&NewPost {
            member_id,
            kind: kind.as_str(),
            title: title.trim(),
            body,
            created_at: Utc::now().naive_utc(),
        })
        .returning(posts::id)
        .get_result::<i32>(conn)?;
    finish(conn, member_id, ActivityType::Social, record_id)
}
