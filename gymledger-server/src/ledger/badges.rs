use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use tracing::info;

use super::{LedgerError, is_unique_violation, points};
use crate::storage::models::{Badge, NewMemberBadge};
use crate::storage::schema::{badges, member_badges};

/// Awards a badge once per member.
pub fn grant(
    conn: &mut SqliteConnection,
    member_id: i32,
    badge_id: i32,
) -> Result<(Badge, NaiveDateTime), LedgerError> {
    points::ensure_member(conn, member_id)?;
    let badge = badges::table
        .find(badge_id)
        .select(Badge::as_select())
        .first::<Badge>(conn)
        .optional()?
        .ok_or_else(|| LedgerError::not_found(format_args!("badge {badge_id}")))?;

    let held: i64 = member_badges::table
        .find((member_id, badge_id))
        .count()
        .get_result(conn)?;
    let already = || LedgerError::AlreadyAwarded {
        member_id,
        badge_id,
    };
    if held > 0 {
        return Err(already());
    }

    let earned_at = Utc::now().naive_utc();
    diesel::insert_into(member_badges::table)
        .values(&NewMemberBadge {
            member_id,
            badge_id,
            earned_at,
        })
        .execute(conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                already()
            } else {
                LedgerError::Database(e)
            }
        })?;
    info!(member_id, badge_id, "badge: granted");
    Ok((badge, earned_at))
}
