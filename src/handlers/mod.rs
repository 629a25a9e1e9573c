pub mod option;
pub mod poll;
pub mod results;
pub mod vote;

use actix_web::HttpRequest;
use sqlx::{query_as, PgPool};

use crate::context::UserInfo;
use crate::error::Error;
use crate::models::poll::Poll;

pub(crate) async fn fetch_poll(pool: &PgPool, poll_id: i32) -> Result<Poll, Error> {
    query_as::<_, Poll>("SELECT * FROM polls WHERE id = $1")
        .bind(poll_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound("poll not found".into()))
}

pub(crate) fn require_creator(poll: &Poll, user: &UserInfo) -> Result<(), Error> {
    if poll.creator_id != user.id {
        return Err(Error::Forbidden("you are not authorized to modify this poll".into()));
    }
    Ok(())
}

/// Client address for the anonymous voter fingerprint. Forwarded headers win
/// over the socket peer; the peer address is stripped of its port so the
/// fingerprint survives reconnects.
pub(crate) fn client_ip(req: &HttpRequest) -> String {
    let info = req.connection_info();
    match info.realip_remote_addr() {
        Some(addr) => match addr.parse::<std::net::SocketAddr>() {
            Ok(sock) => sock.ip().to_string(),
            Err(_) => addr.to_string(),
        },
        None => "unknown".to_string(),
    }
}
