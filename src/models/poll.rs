use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    #[default]
    Draft,
    Active,
    Closed,
}

/// Complex polls may attach a photo or link to each option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PollType {
    #[default]
    Simple,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    SingleChoice,
    RankedChoice,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Poll {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub poll_type: PollType,
    pub question_type: QuestionType,
    pub allow_user_submitted_answers: bool,
    pub allow_unauthenticated_voting: bool,
    pub allow_free_text_response: bool,
    pub status: PollStatus,
    pub creator_id: i32,
    pub article_id: Option<i32>,
    pub location_id: Option<String>,
    // advisory window, not enforced by the vote path
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
