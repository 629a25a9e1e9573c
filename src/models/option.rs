use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PollOption {
    pub id: i32,
    pub poll_id: i32,
    pub text: String,
    pub photo_url: Option<String>,
    pub link_url: Option<String>,
    pub order_index: i32,
    pub is_user_submitted: bool,
    pub submitted_by_user_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}
