use log::warn;
use sqlx::{query, query_scalar, PgPool};

use crate::error::Error;

const CREATE_POLLS: &str = r#"
CREATE TABLE IF NOT EXISTS polls (
    id SERIAL PRIMARY KEY,
    title VARCHAR(200) NOT NULL,
    description TEXT,
    poll_type TEXT NOT NULL DEFAULT 'simple',
    question_type TEXT NOT NULL DEFAULT 'single_choice',
    allow_user_submitted_answers BOOLEAN NOT NULL DEFAULT FALSE,
    allow_unauthenticated_voting BOOLEAN NOT NULL DEFAULT FALSE,
    allow_free_text_response BOOLEAN NOT NULL DEFAULT FALSE,
    status TEXT NOT NULL DEFAULT 'draft',
    creator_id INTEGER NOT NULL,
    article_id INTEGER,
    location_id TEXT,
    starts_at TIMESTAMPTZ,
    ends_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"#;

const CREATE_POLL_OPTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS poll_options (
    id SERIAL PRIMARY KEY,
    poll_id INTEGER NOT NULL REFERENCES polls (id) ON DELETE CASCADE,
    text VARCHAR(500) NOT NULL,
    photo_url TEXT,
    link_url TEXT,
    order_index INTEGER NOT NULL DEFAULT 0,
    is_user_submitted BOOLEAN NOT NULL DEFAULT FALSE,
    submitted_by_user_id INTEGER,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"#;

// UNIQUE (poll_id, user_id) leaves anonymous rows (NULL user_id) unconstrained;
// anonymous dedup goes through voter_identifier and stays best-effort.
const CREATE_POLL_VOTES: &str = r#"
CREATE TABLE IF NOT EXISTS poll_votes (
    id SERIAL PRIMARY KEY,
    poll_id INTEGER NOT NULL REFERENCES polls (id) ON DELETE CASCADE,
    user_id INTEGER,
    option_id INTEGER REFERENCES poll_options (id) ON DELETE CASCADE,
    ranking INTEGER[],
    free_text_response VARCHAR(1000),
    is_authenticated BOOLEAN NOT NULL DEFAULT FALSE,
    voter_identifier TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (poll_id, user_id)
)"#;

const CREATE_VOTER_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_poll_votes_voter ON poll_votes (poll_id, voter_identifier)";

/// Recreates the poll tables when any of them is missing. Idempotent; runs at
/// startup and once more from the poll-creation retry path when a write hits
/// a dropped table.
pub async fn ensure_poll_tables(pool: &PgPool) -> Result<(), Error> {
    let present: i64 = query_scalar(
        r#"
        SELECT COUNT(*) FROM information_schema.tables
        WHERE table_schema = current_schema()
        AND table_name IN ('polls', 'poll_options', 'poll_votes')"#,
    )
    .fetch_one(pool)
    .await?;
    if present == 3 {
        return Ok(());
    }
    warn!("{} of 3 poll tables present, recreating schema", present);
    query(CREATE_POLLS).execute(pool).await?;
    query(CREATE_POLL_OPTIONS).execute(pool).await?;
    query(CREATE_POLL_VOTES).execute(pool).await?;
    query(CREATE_VOTER_INDEX).execute(pool).await?;
    Ok(())
}

/// True when a write failed because a poll table was dropped out-of-band:
/// undefined table (42P01), or a foreign key left dangling by the drop (23503).
pub fn is_missing_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(e) => e.code().map(|c| c == "42P01" || c == "23503").unwrap_or(false),
        _ => false,
    }
}
