use actix_web::http::StatusCode;
use actix_web::web::{Data, Json, Path};
use actix_web::HttpResponse;
use serde::Deserialize;
use sqlx::{query_as, query_scalar, PgPool};

use crate::context::MaybeUser;
use crate::error::Error;
use crate::handlers::fetch_poll;
use crate::models::option::PollOption;
use crate::models::poll::PollStatus;
use crate::response::Envelope;

#[derive(Debug, Clone, Deserialize)]
pub struct OptionSubmission {
    pub text: String,
    pub photo_url: Option<String>,
    pub link_url: Option<String>,
}

/// Voters may extend the option list of an open poll when the creator opted
/// in; existing options are never touched, the list is append-only.
pub async fn add_option(user: MaybeUser, poll_id: Path<(i32,)>, Json(body): Json<OptionSubmission>, db: Data<PgPool>) -> Result<HttpResponse, Error> {
    let poll_id = poll_id.into_inner().0;
    let poll = fetch_poll(&db, poll_id).await?;
    if !poll.allow_user_submitted_answers {
        return Err(Error::Forbidden("this poll does not accept user submitted options".into()));
    }
    if poll.status != PollStatus::Active {
        return Err(Error::Validation("poll is not active".into()));
    }
    let text = body.text.trim();
    if text.is_empty() || text.chars().count() > 500 {
        return Err(Error::Validation("option text must be between 1 and 500 characters".into()));
    }
    let mut tx = db.begin().await?;
    let next_index: i32 = query_scalar("SELECT COALESCE(MAX(order_index), -1) + 1 FROM poll_options WHERE poll_id = $1")
        .bind(poll_id)
        .fetch_one(&mut tx)
        .await?;
    let option: PollOption = query_as(
        r#"
        INSERT INTO poll_options (poll_id, text, photo_url, link_url, order_index, is_user_submitted, submitted_by_user_id)
        VALUES ($1, $2, $3, $4, $5, TRUE, $6)
        RETURNING *"#,
    )
    .bind(poll_id)
    .bind(text)
    .bind(&body.photo_url)
    .bind(&body.link_url)
    .bind(next_index)
    .bind(user.0.map(|u| u.id))
    .fetch_one(&mut tx)
    .await?;
    tx.commit().await?;
    Ok(HttpResponse::build(StatusCode::CREATED).json(Envelope::data(option)))
}
