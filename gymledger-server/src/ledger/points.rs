use chrono::Utc;
use diesel::prelude::*;
use gymledger_shared::domain::LedgerSource;
use tracing::debug;

use super::LedgerError;
use crate::storage::models::NewLedgerEntry;
use crate::storage::schema::{ledger_entries, members};

/// Balance after a credit or debit, plus the audit row that recorded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub entry_id: i32,
    pub balance: i64,
}

/// Adds `amount` to the member's balance and appends a ledger entry. A credit
/// that would overflow the balance is rejected and leaves it untouched.
pub fn credit(
    conn: &mut SqliteConnection,
    member_id: i32,
    amount: i64,
    source: LedgerSource,
    description: Option<&str>,
) -> Result<Posting, LedgerError> {
    if amount < 0 {
        return Err(LedgerError::Validation(format!(
            "credit amount must not be negative, got {amount}"
        )));
    }
    let updated = diesel::update(
        members::table
            .find(member_id)
            .filter(members::point_balance.le(i64::MAX - amount)),
    )
    .set(members::point_balance.eq(members::point_balance + amount))
    .returning(members::point_balance)
    .get_result::<i64>(conn)
    .optional()?;

    let Some(new_balance) = updated else {
        // Zero rows: either the member does not exist or the sum would overflow.
        let available = balance(conn, member_id)?;
        debug!(member_id, amount, available, "ledger: credit rejected");
        return Err(LedgerError::Validation(format!(
            "credit of {amount} would overflow balance {available}"
        )));
    };
    let entry_id = append_entry(conn, member_id, amount, source, description, new_balance)?;
    debug!(member_id, amount, %source, balance = new_balance, "ledger: credit");
    Ok(Posting {
        entry_id,
        balance: new_balance,
    })
}

/// Subtracts `amount` from the member's balance. The balance check and the
/// decrement are a single conditional UPDATE, so concurrent debits can never
/// drive the balance below zero.
pub fn debit(
    conn: &mut SqliteConnection,
    member_id: i32,
    amount: i64,
    source: LedgerSource,
    description: Option<&str>,
) -> Result<Posting, LedgerError> {
    if amount < 0 {
        return Err(LedgerError::Validation(format!(
            "debit amount must not be negative, got {amount}"
        )));
    }
    let updated = diesel::update(
        members::table
            .find(member_id)
            .filter(members::point_balance.ge(amount)),
    )
    .set(members::point_balance.eq(members::point_balance - amount))
    .returning(members::point_balance)
    .get_result::<i64>(conn)
    .optional()?;

    let Some(new_balance) = updated else {
        // Zero rows: either the member does not exist or the guard failed.
        let available = balance(conn, member_id)?;
        debug!(member_id, amount, available, "ledger: debit rejected");
        return Err(LedgerError::InsufficientBalance {
            required: amount,
            available,
        });
    };
    let entry_id = append_entry(conn, member_id, -amount, source, description, new_balance)?;
    debug!(member_id, amount, %source, balance = new_balance, "ledger: debit");
    Ok(Posting {
        entry_id,
        balance: new_balance,
    })
}

/// Current balance; `NotFound` for an unknown member.
pub fn balance(conn: &mut SqliteConnection, member_id: i32) -> Result<i64, LedgerError> {
    members::table
        .find(member_id)
        .select(members::point_balance)
        .first::<i64>(conn)
        .optional()?
        .ok_or_else(|| LedgerError::not_found(format_args!("member {member_id}")))
}

pub fn ensure_member(conn: &mut SqliteConnection, member_id: i32) -> Result<(), LedgerError> {
    balance(conn, member_id).map(|_| ())
}

fn append_entry(
    conn: &mut SqliteConnection,
    member_id: i32,
    amount: i64,
    source: LedgerSource,
    description: Option<&str>,
    balance_after: i64,
) -> Result<i32, LedgerError> {
    let entry = NewLedgerEntry {
        member_id,
        amount,
        source_type: source.as_str(),
        description,
        balance_after,
        created_at: Utc::now().naive_utc(),
    };
    Ok(diesel::insert_into(ledger_entries::table)
        .values(&entry)
        .returning(ledger_entries::id)
        .get_result::<i32>(conn)?)
}
