use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use gymledger_shared::domain::LedgerSource;
use tracing::info;

use super::{LedgerError, points};
use crate::storage::models::{NewPointExchange, NewReward, Reward};
use crate::storage::schema::{point_exchanges, rewards};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub exchange_id: i32,
    pub reward_id: i32,
    pub reward_name: String,
    pub used_points: i64,
    pub balance: i64,
    pub exchanged_at: NaiveDateTime,
}

/// Exchanges `required_points` of the member's balance for one unit of the
/// reward.
///
/// Stock is reserved first with a conditional decrement, then the balance is
/// debited. When the debit fails the caller's transaction rolls back and the
/// reservation goes with it, so a failed redemption never oversells and
/// never leaves stock or balance changed.
pub fn redeem(
    conn: &mut SqliteConnection,
    member_id: i32,
    reward_id: i32,
) -> Result<Redemption, LedgerError> {
    let reward = find_reward(conn, reward_id)?;

    let reserved = diesel::update(
        rewards::table
            .find(reward_id)
            .filter(rewards::stock_quantity.gt(0_i64)),
    )
    .set(rewards::stock_quantity.eq(rewards::stock_quantity - 1_i64))
    .execute(conn)?;
    if reserved == 0 {
        return Err(LedgerError::OutOfStock(reward_id));
    }

    let posting = points::debit(
        conn,
        member_id,
        reward.required_points,
        LedgerSource::Redemption,
        Some(&reward.name),
    )?;

    let exchanged_at = Utc::now().naive_utc();
    let exchange_id = diesel::insert_into(point_exchanges::table)
        .values(&NewPointExchange {
            member_id,
            reward_id,
            used_points: reward.required_points,
            exchanged_at,
        })
        .returning(point_exchanges::id)
        .get_result::<i32>(conn)?;
    info!(
        member_id,
        reward_id,
        exchange_id,
        used_points = reward.required_points,
        balance = posting.balance,
        "exchange: redeemed"
    );
    Ok(Redemption {
        exchange_id,
        reward_id,
        reward_name: reward.name,
        used_points: reward.required_points,
        balance: posting.balance,
        exchanged_at,
    })
}

pub fn find_reward(conn: &mut SqliteConnection, reward_id: i32) -> Result<Reward, LedgerError> {
    rewards::table
        .find(reward_id)
        .select(Reward::as_select())
        .first::<Reward>(conn)
        .optional()?
        .ok_or_else(|| LedgerError::not_found(format_args!("reward {reward_id}")))
}

pub fn create_reward(
    conn: &mut SqliteConnection,
    name: &str,
    required_points: i64,
    stock_quantity: i64,
    category: Option<&str>,
) -> Result<Reward, LedgerError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::Validation("reward name is required".into()));
    }
    if required_points <= 0 {
        return Err(LedgerError::Validation(
            "required_points must be positive".into(),
        ));
    }
    if stock_quantity < 0 {
        return Err(LedgerError::Validation(
            "stock_quantity must not be negative".into(),
        ));
    }
    let reward = diesel::insert_into(rewards::table)
        .values(&NewReward {
            id: None,
            name,
            required_points,
            stock_quantity,
            category,
        })
        .returning(Reward::as_returning())
        .get_result::<Reward>(conn)?;
    info!(reward_id = reward.id, name = %reward.name, "exchange: reward created");
    Ok(reward)
}

/// Adds `quantity` units to a reward's stock and returns the new level.
pub fn restock(
    conn: &mut SqliteConnection,
    reward_id: i32,
    quantity: i64,
) -> Result<i64, LedgerError> {
    if quantity <= 0 {
        return Err(LedgerError::Validation(
            "restock quantity must be positive".into(),
        ));
    }
    let stock = diesel::update(rewards::table.find(reward_id))
        .set(rewards::stock_quantity.eq(rewards::stock_quantity + quantity))
        .returning(rewards::stock_quantity)
        .get_result::<i64>(conn)
        .optional()?
        .ok_or_else(|| LedgerError::not_found(format_args!("reward {reward_id}")))?;
    info!(reward_id, quantity, stock, "exchange: restocked");
    Ok(stock)
}
