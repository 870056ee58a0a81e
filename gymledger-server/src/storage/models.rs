use crate::storage::schema::{
    activity_events, attendance, badges, diet_logs, exercise_logs, goals, ledger_entries,
    member_badges, member_quests, members, point_exchanges, posts, quests, rewards, sessions,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = members)]
pub struct Member {
    pub id: i32,
    pub name: String,
    pub point_balance: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = members)]
pub struct NewMember<'a> {
    pub id: i32,
    pub name: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = quests)]
pub struct Quest {
    pub id: i32,
    pub name: String,
    pub quest_type: String,
    pub target_value: i32,
    pub points_reward: i64,
    pub description: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = quests)]
pub struct NewQuest<'a> {
    pub id: i32,
    pub name: &'a str,
    pub quest_type: &'a str,
    pub target_value: i32,
    pub points_reward: i64,
    pub description: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = member_quests)]
#[diesel(primary_key(member_id, quest_id))]
#[diesel(belongs_to(Member, foreign_key = member_id))]
#[diesel(belongs_to(Quest, foreign_key = quest_id))]
pub struct MemberQuest {
    pub member_id: i32,
    pub quest_id: i32,
    pub current_progress: i32,
    pub is_completed: bool,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = member_quests)]
pub struct NewMemberQuest {
    pub member_id: i32,
    pub quest_id: i32,
    pub current_progress: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = ledger_entries)]
pub struct LedgerEntry {
    pub id: i32,
    pub member_id: i32,
    pub amount: i64,
    pub source_type: String,
    pub description: Option<String>,
    pub balance_after: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = ledger_entries)]
pub struct NewLedgerEntry<'a> {
    pub member_id: i32,
    pub amount: i64,
    pub source_type: &'a str,
    pub description: Option<&'a str>,
    pub balance_after: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = rewards)]
pub struct Reward {
    pub id: i32,
    pub name: String,
    pub required_points: i64,
    pub stock_quantity: i64,
    pub category: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = rewards)]
pub struct NewReward<'a> {
    pub id: Option<i32>,
    pub name: &'a str,
    pub required_points: i64,
    pub stock_quantity: i64,
    pub category: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = point_exchanges)]
pub struct PointExchange {
    pub id: i32,
    pub member_id: i32,
    pub reward_id: i32,
    pub used_points: i64,
    pub exchanged_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = point_exchanges)]
pub struct NewPointExchange {
    pub member_id: i32,
    pub reward_id: i32,
    pub used_points: i64,
    pub exchanged_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub username: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = attendance)]
pub struct Attendance {
    pub id: i32,
    pub member_id: i32,
    pub attended_on: NaiveDate,
    pub attended_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = attendance)]
pub struct NewAttendance {
    pub member_id: i32,
    pub attended_on: NaiveDate,
    pub attended_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = activity_events)]
pub struct NewActivityEvent<'a> {
    pub member_id: i32,
    pub activity_type: &'a str,
    pub idempotency_key: Option<&'a str>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = exercise_logs)]
pub struct NewExerciseLog<'a> {
    pub member_id: i32,
    pub exercise_name: &'a str,
    pub duration_minutes: Option<i32>,
    pub performed_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = diet_logs)]
pub struct NewDietLog<'a> {
    pub member_id: i32,
    pub food_name: &'a str,
    pub meal_type: Option<&'a str>,
    pub ate_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = goals)]
pub struct Goal {
    pub id: i32,
    pub member_id: i32,
    pub item_name: String,
    pub target_date: NaiveDate,
    pub is_achieved: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = goals)]
pub struct NewGoal<'a> {
    pub member_id: i32,
    pub item_name: &'a str,
    pub target_date: NaiveDate,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost<'a> {
    pub member_id: i32,
    pub kind: &'a str,
    pub title: &'a str,
    pub body: Option<&'a str>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = badges)]
pub struct Badge {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = badges)]
pub struct NewBadge<'a> {
    pub id: i32,
    pub name: &'a str,
    pub description: Option<&'a str>,
}

#[derive(Insertable)]
#[diesel(table_name = member_badges)]
pub struct NewMemberBadge {
    pub member_id: i32,
    pub badge_id: i32,
    pub earned_at: NaiveDateTime,
}
