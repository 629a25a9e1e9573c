use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PollVote {
    pub id: i32,
    pub poll_id: i32,
    pub user_id: Option<i32>,
    pub option_id: Option<i32>,
    pub ranking: Option<Vec<i32>>,
    pub free_text_response: Option<String>,
    pub is_authenticated: bool,
    pub voter_identifier: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A vote payload after validation against the poll's question type. The two
/// variants replace field-by-field shape checks downstream: whatever reaches
/// the insert is already a well-formed ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ballot {
    SingleChoice { option_id: Option<i32>, free_text: Option<String> },
    RankedChoice { ranking: Vec<i32>, free_text: Option<String> },
}

impl Ballot {
    pub fn into_columns(self) -> (Option<i32>, Option<Vec<i32>>, Option<String>) {
        match self {
            Ballot::SingleChoice { option_id, free_text } => (option_id, None, free_text),
            Ballot::RankedChoice { ranking, free_text } => (None, Some(ranking), free_text),
        }
    }
}
