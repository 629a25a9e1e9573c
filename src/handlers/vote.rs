use actix_web::http::StatusCode;
use actix_web::web::{Data, Json, Path};
use actix_web::{HttpRequest, HttpResponse};
use serde::Deserialize;
use sqlx::{query_as, query_scalar, PgPool};

use crate::context::MaybeUser;
use crate::error::Error;
use crate::fingerprint::{voter_identifier, VoterSalt};
use crate::handlers::{client_ip, fetch_poll};
use crate::models::poll::{Poll, PollStatus, QuestionType};
use crate::models::vote::{Ballot, PollVote};
use crate::response::Envelope;

#[derive(Debug, Clone, Deserialize)]
pub struct VoteSubmission {
    pub option_id: Option<i32>,
    pub ranking: Option<Vec<i32>>,
    pub free_text_response: Option<String>,
}

enum VoterKey {
    User(i32),
    Anonymous(String),
}

/// Shapes the raw submission into a [`Ballot`] for this poll's question type.
///
/// A ranking must be a duplicate-free preference order over this poll's
/// options; ranking a subset of the options is allowed.
fn build_ballot(poll: &Poll, option_ids: &[i32], submission: VoteSubmission) -> Result<Ballot, Error> {
    let free_text = submission.free_text_response.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
    let ballot = match poll.question_type {
        QuestionType::SingleChoice => {
            if let Some(id) = submission.option_id {
                if !option_ids.contains(&id) {
                    return Err(Error::Validation("option does not belong to this poll".into()));
                }
            }
            if submission.option_id.is_none() && free_text.is_none() {
                return Err(Error::Validation("either an option or a free text response is required".into()));
            }
            Ballot::SingleChoice {
                option_id: submission.option_id,
                free_text,
            }
        }
        QuestionType::RankedChoice => {
            let ranking = submission.ranking.unwrap_or_default();
            if ranking.is_empty() {
                return Err(Error::Validation("a non-empty ranking is required".into()));
            }
            for id in &ranking {
                if !option_ids.contains(id) {
                    return Err(Error::Validation("ranking contains an option that does not belong to this poll".into()));
                }
            }
            let mut deduped = ranking.clone();
            deduped.sort_unstable();
            deduped.dedup();
            if deduped.len() != ranking.len() {
                return Err(Error::Validation("ranking must not contain duplicate options".into()));
            }
            Ballot::RankedChoice { ranking, free_text }
        }
    };
    if let Ballot::SingleChoice { free_text: Some(t), .. } | Ballot::RankedChoice { free_text: Some(t), .. } = &ballot {
        if !poll.allow_free_text_response {
            return Err(Error::Validation("free text responses are not allowed on this poll".into()));
        }
        if t.chars().count() > 1000 {
            return Err(Error::Validation("free text response must be at most 1000 characters".into()));
        }
    }
    Ok(ballot)
}

pub async fn submit(
    user: MaybeUser,
    req: HttpRequest,
    poll_id: Path<(i32,)>,
    Json(body): Json<VoteSubmission>,
    db: Data<PgPool>,
    salt: Data<VoterSalt>,
) -> Result<HttpResponse, Error> {
    let poll_id = poll_id.into_inner().0;
    let poll = fetch_poll(&db, poll_id).await?;
    if poll.status != PollStatus::Active {
        return Err(Error::Validation("poll is not active".into()));
    }
    if user.0.is_none() && !poll.allow_unauthenticated_voting {
        return Err(Error::Unauthorized("authentication is required to vote on this poll".into()));
    }
    let voter_key = match &user.0 {
        Some(u) => VoterKey::User(u.id),
        None => VoterKey::Anonymous(voter_identifier(&client_ip(&req), &salt)),
    };
    let mut conn = db.acquire().await?;
    let already_voted: bool = match &voter_key {
        VoterKey::User(id) => {
            query_scalar("SELECT EXISTS(SELECT id FROM poll_votes WHERE poll_id = $1 AND user_id = $2)")
                .bind(poll_id)
                .bind(id)
                .fetch_one(&mut conn)
                .await?
        }
        VoterKey::Anonymous(fp) => {
            query_scalar("SELECT EXISTS(SELECT id FROM poll_votes WHERE poll_id = $1 AND voter_identifier = $2)")
                .bind(poll_id)
                .bind(fp)
                .fetch_one(&mut conn)
                .await?
        }
    };
    if already_voted {
        return Err(Error::Conflict("you have already voted on this poll".into()));
    }
    let option_ids: Vec<i32> = query_scalar("SELECT id FROM poll_options WHERE poll_id = $1")
        .bind(poll_id)
        .fetch_all(&mut conn)
        .await?;
    let ballot = build_ballot(&poll, &option_ids, body)?;
    let (option_id, ranking, free_text) = ballot.into_columns();
    let (user_id, fp) = match voter_key {
        VoterKey::User(id) => (Some(id), None),
        VoterKey::Anonymous(fp) => (None, Some(fp)),
    };
    let vote: PollVote = query_as(
        r#"
        INSERT INTO poll_votes (poll_id, user_id, option_id, ranking, free_text_response, is_authenticated, voter_identifier)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *"#,
    )
    .bind(poll_id)
    .bind(user_id)
    .bind(option_id)
    .bind(ranking)
    .bind(free_text)
    .bind(user_id.is_some())
    .bind(fp)
    .fetch_one(&mut conn)
    .await
    // the check above races against concurrent submissions; the unique
    // constraint on (poll_id, user_id) settles the loser here
    .map_err(|e| {
        if let sqlx::Error::Database(d) = &e {
            if d.code().as_deref() == Some("23505") {
                return Error::Conflict("you have already voted on this poll".into());
            }
        }
        Error::Database(e)
    })?;
    Ok(HttpResponse::build(StatusCode::CREATED).json(Envelope::data(vote)))
}
