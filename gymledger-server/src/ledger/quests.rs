use std::collections::HashMap;

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use gymledger_shared::domain::{ActivityType, LedgerSource};
use tracing::{debug, info};

use super::{CompletedQuest, LedgerError, QuestOutcome, points};
use crate::storage::models::{MemberQuest, NewMemberQuest, Quest};
use crate::storage::schema::{member_quests, quests};

/// Advances every open quest of `activity`'s type by one unit for the
/// member, completing and paying out the ones that reach their target.
///
/// Quests are visited smallest target first so that stacked quests of
/// increasing difficulty complete in a predictable order. Points are
/// credited only by the write that flips `is_completed`, which makes a
/// completion pay out exactly once even if two evaluations interleave.
pub fn evaluate(
    conn: &mut SqliteConnection,
    member_id: i32,
    activity: ActivityType,
) -> Result<QuestOutcome, LedgerError> {
    points::ensure_member(conn, member_id)?;

    let candidates = quests::table
        .filter(quests::quest_type.eq(activity.as_str()))
        .order((quests::target_value.asc(), quests::id.asc()))
        .select(Quest::as_select())
        .load::<Quest>(conn)?;
    let mut outcome = QuestOutcome::default();
    if candidates.is_empty() {
        return Ok(outcome);
    }

    let quest_ids: Vec<i32> = candidates.iter().map(|q| q.id).collect();
    let progress: HashMap<i32, MemberQuest> = member_quests::table
        .filter(member_quests::member_id.eq(member_id))
        .filter(member_quests::quest_id.eq_any(&quest_ids))
        .select(MemberQuest::as_select())
        .load::<MemberQuest>(conn)?
        .into_iter()
        .map(|row| (row.quest_id, row))
        .collect();

    let now = Utc::now().naive_utc();
    for quest in candidates {
        let new_progress = match progress.get(&quest.id) {
            Some(row) if row.is_completed => continue,
            Some(_) => match advance(conn, member_id, quest.id)? {
                Some(p) => p,
                // Completed by someone else since we read it.
                None => continue,
            },
            None => {
                diesel::insert_into(member_quests::table)
                    .values(&NewMemberQuest {
                        member_id,
                        quest_id: quest.id,
                        current_progress: 1,
                    })
                    .execute(conn)?;
                1
            }
        };
        debug!(
            member_id,
            quest_id = quest.id,
            progress = new_progress,
            target = quest.target_value,
            "quest: progress"
        );

        if new_progress < quest.target_value || !mark_completed(conn, member_id, quest.id, now)? {
            continue;
        }
        points::credit(
            conn,
            member_id,
            quest.points_reward,
            LedgerSource::QuestCompletion,
            Some(&quest.name),
        )?;
        info!(
            member_id,
            quest_id = quest.id,
            points = quest.points_reward,
            "quest: completed"
        );
        outcome.points_earned += quest.points_reward;
        outcome.completed_quests.push(CompletedQuest {
            quest_id: quest.id,
            name: quest.name,
            points_reward: quest.points_reward,
        });
    }
    Ok(outcome)
}

/// Increments progress of an open quest row; `None` once it is completed.
fn advance(
    conn: &mut SqliteConnection,
    member_id: i32,
    quest_id: i32,
) -> Result<Option<i32>, LedgerError> {
    Ok(diesel::update(
        member_quests::table
            .find((member_id, quest_id))
            .filter(member_quests::is_completed.eq(false)),
    )
    .set(member_quests::current_progress.eq(member_quests::current_progress + 1_i32))
    .returning(member_quests::current_progress)
    .get_result::<i32>(conn)
    .optional()?)
}

/// Flips `is_completed`; returns whether this call performed the flip.
fn mark_completed(
    conn: &mut SqliteConnection,
    member_id: i32,
    quest_id: i32,
    now: NaiveDateTime,
) -> Result<bool, LedgerError> {
    let flipped = diesel::update(
        member_quests::table
            .find((member_id, quest_id))
            .filter(member_quests::is_completed.eq(false)),
    )
    .set((
        member_quests::is_completed.eq(true),
        member_quests::completed_at.eq(Some(now)),
    ))
    .execute(conn)?;
    Ok(flipped == 1)
}

/// Quest catalog joined with the member's progress, ordered by type then
/// target. Quests the member never touched show zero progress.
pub fn board(
    conn: &mut SqliteConnection,
    member_id: i32,
) -> Result<Vec<(Quest, Option<MemberQuest>)>, LedgerError> {
    points::ensure_member(conn, member_id)?;
    let catalog = quests::table
        .order((
            quests::quest_type.asc(),
            quests::target_value.asc(),
            quests::id.asc(),
        ))
        .select(Quest::as_select())
        .load::<Quest>(conn)?;
    let mut progress: HashMap<i32, MemberQuest> = member_quests::table
        .filter(member_quests::member_id.eq(member_id))
        .select(MemberQuest::as_select())
        .load::<MemberQuest>(conn)?
        .into_iter()
        .map(|row| (row.quest_id, row))
        .collect();
    Ok(catalog
        .into_iter()
        .map(|q| {
            let row = progress.remove(&q.id);
            (q, row)
        })
        .collect())
}
