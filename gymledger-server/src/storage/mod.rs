pub mod models;
pub mod schema;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use gymledger_shared::domain::{self as cfg, LedgerSource, PostKind};
use models::{
    Attendance, Badge, Goal, LedgerEntry, MemberQuest, NewBadge, NewMember, NewQuest, NewReward,
    NewSession, PointExchange, Quest, Reward,
};
use tracing::{info, trace};

use crate::ledger::activity::{self, ActivityOutcome};
use crate::ledger::attendance::{self, CheckIn};
use crate::ledger::exchange::{self, Redemption};
use crate::ledger::points::{self, Posting};
use crate::ledger::{LedgerError, badges, quests};

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, lock timeout, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// A ledger operation was rejected or failed; its transaction was rolled back.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StorageError {
    /// Transport and store failures a caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Database(_) | StorageError::Pool(_) | StorageError::Task(_) => true,
            StorageError::Ledger(LedgerError::Database(_)) => true,
            _ => false,
        }
    }

    /// The ledger rejection behind this error, if any.
    pub fn ledger(&self) -> Option<&LedgerError> {
        match self {
            StorageError::Ledger(e) => Some(e),
            _ => None,
        }
    }
}

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    /// Runs `f` on a pooled connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut conn)
        })
        .await?
    }

    /// Runs a ledger operation in an IMMEDIATE transaction: the write lock is
    /// taken up front and any error rolls back every row it touched.
    async fn in_transaction<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, LedgerError> + Send + 'static,
    {
        self.with_conn(move |conn| Ok(conn.immediate_transaction(f)?))
            .await
    }

    /// Upserts catalog entries from config. Balances and reward stock are
    /// only set when a row is first created; reseeding never resets them.
    pub async fn seed_from_config(
        &self,
        cfg_members: &[cfg::Member],
        cfg_quests: &[cfg::Quest],
        cfg_rewards: &[cfg::Reward],
        cfg_badges: &[cfg::Badge],
    ) -> Result<(), StorageError> {
        use schema::{badges, members, quests, rewards};

        let members_owned = cfg_members.to_owned();
        let quests_owned = cfg_quests.to_owned();
        let rewards_owned = cfg_rewards.to_owned();
        let badges_owned = cfg_badges.to_owned();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(), StorageError> {
                for m in &members_owned {
                    diesel::insert_into(members::table)
                        .values(&NewMember {
                            id: m.id,
                            name: &m.name,
                        })
                        .on_conflict(members::id)
                        .do_update()
                        .set(members::name.eq(&m.name))
                        .execute(conn)?;
                }

                for q in &quests_owned {
                    let new_quest = NewQuest {
                        id: q.id,
                        name: &q.name,
                        quest_type: q.quest_type.as_str(),
                        target_value: q.target_value,
                        points_reward: q.points_reward,
                        description: q.description.as_deref(),
                    };
                    diesel::insert_into(quests::table)
                        .values(&new_quest)
                        .on_conflict(quests::id)
                        .do_update()
                        .set((
                            quests::name.eq(new_quest.name),
                            quests::quest_type.eq(new_quest.quest_type),
                            quests::target_value.eq(new_quest.target_value),
                            quests::points_reward.eq(new_quest.points_reward),
                            quests::description.eq(new_quest.description),
                        ))
                        .execute(conn)?;
                }

                for r in &rewards_owned {
                    let new_reward = NewReward {
                        id: Some(r.id),
                        name: &r.name,
                        required_points: r.required_points,
                        stock_quantity: r.stock_quantity,
                        category: r.category.as_deref(),
                    };
                    diesel::insert_into(rewards::table)
                        .values(&new_reward)
                        .on_conflict(rewards::id)
                        .do_update()
                        .set((
                            rewards::name.eq(new_reward.name),
                            rewards::required_points.eq(new_reward.required_points),
                            rewards::category.eq(new_reward.category),
                        ))
                        .execute(conn)?;
                }

                for b in &badges_owned {
                    let new_badge = NewBadge {
                        id: b.id,
                        name: &b.name,
                        description: b.description.as_deref(),
                    };
                    diesel::insert_into(badges::table)
                        .values(&new_badge)
                        .on_conflict(badges::id)
                        .do_update()
                        .set((
                            badges::name.eq(new_badge.name),
                            badges::description.eq(new_badge.description),
                        ))
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await?;
        info!(
            members = cfg_members.len(),
            quests = cfg_quests.len(),
            rewards = cfg_rewards.len(),
            badges = cfg_badges.len(),
            "seeded catalog from config"
        );
        Ok(())
    }

    // Points

    pub async fn balance(&self, member_id: i32) -> Result<i64, StorageError> {
        self.with_conn(move |conn| Ok(points::balance(conn, member_id)?))
            .await
    }

    pub async fn credit_points(
        &self,
        member_id: i32,
        amount: i64,
        source: LedgerSource,
        description: Option<&str>,
    ) -> Result<Posting, StorageError> {
        let description = description.map(str::to_string);
        self.in_transaction(move |conn| {
            points::credit(conn, member_id, amount, source, description.as_deref())
        })
        .await
    }

    pub async fn debit_points(
        &self,
        member_id: i32,
        amount: i64,
        source: LedgerSource,
        description: Option<&str>,
    ) -> Result<Posting, StorageError> {
        let description = description.map(str::to_string);
        self.in_transaction(move |conn| {
            points::debit(conn, member_id, amount, source, description.as_deref())
        })
        .await
    }

    pub async fn list_ledger(
        &self,
        member_id: i32,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<LedgerEntry>, StorageError> {
        use schema::ledger_entries::dsl as le;
        let page = page.max(1);
        let per_page = per_page.clamp(1, 1000) as i64;
        let offset = ((page as i64) - 1) * per_page;
        self.with_conn(move |conn| {
            Ok(le::ledger_entries
                .filter(le::member_id.eq(member_id))
                .order((le::created_at.desc(), le::id.desc()))
                .offset(offset)
                .limit(per_page)
                .select(LedgerEntry::as_select())
                .load::<LedgerEntry>(conn)?)
        })
        .await
    }

    /// Sum of all ledger amounts for the member; equals the balance as long
    /// as every balance change went through the ledger. Summed in posting
    /// order, where every running total is a past balance.
    pub async fn ledger_sum(&self, member_id: i32) -> Result<i64, StorageError> {
        use schema::ledger_entries::dsl as le;
        self.with_conn(move |conn| {
            let amounts = le::ledger_entries
                .filter(le::member_id.eq(member_id))
                .order(le::id.asc())
                .select(le::amount)
                .load::<i64>(conn)?;
            Ok(amounts.into_iter().sum())
        })
        .await
    }

    // Quests

    pub async fn list_quests(&self) -> Result<Vec<Quest>, StorageError> {
        use schema::quests::dsl as q;
        self.with_conn(|conn| {
            Ok(q::quests
                .order((q::quest_type.asc(), q::target_value.asc(), q::id.asc()))
                .select(Quest::as_select())
                .load::<Quest>(conn)?)
        })
        .await
    }

    pub async fn quest_board(
        &self,
        member_id: i32,
    ) -> Result<Vec<(Quest, Option<MemberQuest>)>, StorageError> {
        self.with_conn(move |conn| Ok(quests::board(conn, member_id)?))
            .await
    }

    // Activities

    pub async fn check_in(
        &self,
        member_id: i32,
        today: NaiveDate,
        bonus: i64,
    ) -> Result<CheckIn, StorageError> {
        trace!(member_id, %today, "check_in starting");
        self.in_transaction(move |conn| attendance::check_in(conn, member_id, today, bonus))
            .await
    }

    /// Attendance history, newest first; `on` narrows it to one gym day.
    pub async fn list_attendance(
        &self,
        member_id: i32,
        on: Option<NaiveDate>,
    ) -> Result<Vec<Attendance>, StorageError> {
        use schema::attendance::dsl as a;
        self.with_conn(move |conn| {
            let mut query = a::attendance
                .filter(a::member_id.eq(member_id))
                .into_boxed();
            if let Some(day) = on {
                query = query.filter(a::attended_on.eq(day));
            }
            Ok(query
                .order(a::attended_on.desc())
                .select(Attendance::as_select())
                .load::<Attendance>(conn)?)
        })
        .await
    }

    pub async fn log_exercise(
        &self,
        member_id: i32,
        exercise_name: &str,
        duration_minutes: Option<i32>,
        performed_at: Option<NaiveDateTime>,
        idempotency_key: Option<&str>,
    ) -> Result<ActivityOutcome, StorageError> {
        let name = exercise_name.to_string();
        let key = idempotency_key.map(str::to_string);
        self.in_transaction(move |conn| {
            activity::log_exercise(
                conn,
                member_id,
                &name,
                duration_minutes,
                performed_at,
                key.as_deref(),
            )
        })
        .await
    }

    pub async fn log_diet(
        &self,
        member_id: i32,
        food_name: &str,
        meal_type: Option<&str>,
        ate_at: Option<NaiveDateTime>,
        idempotency_key: Option<&str>,
    ) -> Result<ActivityOutcome, StorageError> {
        let food = food_name.to_string();
        let meal = meal_type.map(str::to_string);
        let key = idempotency_key.map(str::to_string);
        self.in_transaction(move |conn| {
            activity::log_diet(
                conn,
                member_id,
                &food,
                meal.as_deref(),
                ate_at,
                key.as_deref(),
            )
        })
        .await
    }

    pub async fn create_goal(
        &self,
        member_id: i32,
        item_name: &str,
        target_date: NaiveDate,
    ) -> Result<Goal, StorageError> {
        let item = item_name.to_string();
        self.in_transaction(move |conn| activity::create_goal(conn, member_id, &item, target_date))
            .await
    }

    pub async fn achieve_goal(
        &self,
        member_id: i32,
        goal_id: i32,
        idempotency_key: Option<&str>,
    ) -> Result<ActivityOutcome, StorageError> {
        let key = idempotency_key.map(str::to_string);
        self.in_transaction(move |conn| {
            activity::achieve_goal(conn, member_id, goal_id, key.as_deref())
        })
        .await
    }

    pub async fn create_post(
        &self,
        member_id: i32,
        kind: PostKind,
        title: &str,
        body: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<ActivityOutcome, StorageError> {
        let title = title.to_string();
        let body = body.map(str::to_string);
        let key = idempotency_key.map(str::to_string);
        self.in_transaction(move |conn| {
            activity::create_post(
                conn,
                member_id,
                kind,
                &title,
                body.as_deref(),
                key.as_deref(),
            )
        })
        .await
    }

    // Rewards

    pub async fn list_rewards(&self) -> Result<Vec<Reward>, StorageError> {
        use schema::rewards::dsl as r;
        self.with_conn(|conn| {
            Ok(r::rewards
                .order((r::category.asc(), r::required_points.asc(), r::id.asc()))
                .select(Reward::as_select())
                .load::<Reward>(conn)?)
        })
        .await
    }

    pub async fn get_reward(&self, reward_id: i32) -> Result<Option<Reward>, StorageError> {
        use schema::rewards::dsl as r;
        self.with_conn(move |conn| {
            Ok(r::rewards
                .find(reward_id)
                .select(Reward::as_select())
                .first::<Reward>(conn)
                .optional()?)
        })
        .await
    }

    pub async fn create_reward(
        &self,
        name: &str,
        required_points: i64,
        stock_quantity: i64,
        category: Option<&str>,
    ) -> Result<Reward, StorageError> {
        let name = name.to_string();
        let category = category.map(str::to_string);
        self.in_transaction(move |conn| {
            exchange::create_reward(
                conn,
                &name,
                required_points,
                stock_quantity,
                category.as_deref(),
            )
        })
        .await
    }

    pub async fn restock_reward(&self, reward_id: i32, quantity: i64) -> Result<i64, StorageError> {
        self.in_transaction(move |conn| exchange::restock(conn, reward_id, quantity))
            .await
    }

    pub async fn redeem(&self, member_id: i32, reward_id: i32) -> Result<Redemption, StorageError> {
        trace!(member_id, reward_id, "redeem starting");
        self.in_transaction(move |conn| exchange::redeem(conn, member_id, reward_id))
            .await
    }

    pub async fn list_exchanges(
        &self,
        member_id: i32,
    ) -> Result<Vec<(PointExchange, String)>, StorageError> {
        use schema::{point_exchanges, rewards};
        self.with_conn(move |conn| {
            Ok(point_exchanges::table
                .inner_join(rewards::table)
                .filter(point_exchanges::member_id.eq(member_id))
                .order((
                    point_exchanges::exchanged_at.desc(),
                    point_exchanges::id.desc(),
                ))
                .select((PointExchange::as_select(), rewards::name))
                .load::<(PointExchange, String)>(conn)?)
        })
        .await
    }

    pub async fn count_exchanges_for_reward(&self, reward_id: i32) -> Result<i64, StorageError> {
        use schema::point_exchanges::dsl as pe;
        self.with_conn(move |conn| {
            Ok(pe::point_exchanges
                .filter(pe::reward_id.eq(reward_id))
                .count()
                .get_result::<i64>(conn)?)
        })
        .await
    }

    // Badges

    pub async fn list_badges(&self) -> Result<Vec<Badge>, StorageError> {
        use schema::badges::dsl as b;
        self.with_conn(|conn| {
            Ok(b::badges
                .order(b::id.asc())
                .select(Badge::as_select())
                .load::<Badge>(conn)?)
        })
        .await
    }

    pub async fn list_member_badges(
        &self,
        member_id: i32,
    ) -> Result<Vec<(Badge, NaiveDateTime)>, StorageError> {
        use schema::{badges, member_badges};
        self.with_conn(move |conn| {
            Ok(member_badges::table
                .inner_join(badges::table)
                .filter(member_badges::member_id.eq(member_id))
                .order(member_badges::earned_at.desc())
                .select((Badge::as_select(), member_badges::earned_at))
                .load::<(Badge, NaiveDateTime)>(conn)?)
        })
        .await
    }

    pub async fn grant_badge(
        &self,
        member_id: i32,
        badge_id: i32,
    ) -> Result<(Badge, NaiveDateTime), StorageError> {
        self.in_transaction(move |conn| badges::grant(conn, member_id, badge_id))
            .await
    }

    // Session helpers for JWT inactivity windows
    pub async fn create_session(&self, jti_: &str, username_: &str) -> Result<(), StorageError> {
        use schema::sessions;
        let j = jti_.to_string();
        let u = username_.to_string();
        self.with_conn(move |conn| {
            let new = NewSession {
                jti: &j,
                username: &u,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Touch session atomically, but only if it hasn't expired.
    /// Returns `true` if the session was found and updated, `false` otherwise.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let j = jti_.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // WAL for read/write concurrency; busy_timeout bounds how long a writer
    // waits for the lock before the request fails as retryable.
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}
