use actix_web::http::StatusCode;
use actix_web::web::{Data, Path};
use actix_web::HttpResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{query_as, PgPool};
use std::collections::HashMap;

use crate::error::Error;
use crate::handlers::fetch_poll;
use crate::models::option::PollOption;
use crate::models::poll::{Poll, QuestionType};
use crate::models::vote::PollVote;
use crate::response::Envelope;

#[derive(Debug, Serialize, PartialEq)]
pub struct OptionStats {
    pub option_id: i32,
    pub text: String,
    pub total_votes: i64,
    pub authenticated_votes: i64,
    pub unauthenticated_votes: i64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct FreeTextEntry {
    pub response: String,
    pub is_authenticated: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PollResults {
    pub poll_id: i32,
    pub question_type: QuestionType,
    pub total_votes: i64,
    pub authenticated_votes: i64,
    pub unauthenticated_votes: i64,
    pub option_stats: Vec<OptionStats>,
    pub free_text_responses: Vec<FreeTextEntry>,
}

/// The option a ballot counts toward: the direct selection for single-choice
/// votes, the first preference for ranked ballots. Free-text-only ballots
/// count toward the poll total without touching any option.
fn counted_option(vote: &PollVote) -> Option<i32> {
    match vote.option_id {
        Some(id) => Some(id),
        None => vote.ranking.as_ref().and_then(|r| r.first().copied()),
    }
}

fn percentage(count: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 10000.0 / total as f64).round() / 100.0
}

pub(crate) fn tally(poll: &Poll, options: Vec<PollOption>, votes: &[PollVote]) -> PollResults {
    let total_votes = votes.len() as i64;
    let authenticated_votes = votes.iter().filter(|v| v.is_authenticated).count() as i64;
    let mut per_option: HashMap<i32, (i64, i64)> = HashMap::new();
    for vote in votes {
        if let Some(id) = counted_option(vote) {
            let entry = per_option.entry(id).or_insert((0, 0));
            entry.0 += 1;
            if vote.is_authenticated {
                entry.1 += 1;
            }
        }
    }
    let mut ranked: Vec<(PollOption, i64, i64)> = options
        .into_iter()
        .map(|o| {
            let (count, auth) = per_option.get(&o.id).copied().unwrap_or((0, 0));
            (o, count, auth)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.order_index.cmp(&b.0.order_index)));
    let option_stats = ranked
        .into_iter()
        .map(|(o, count, auth)| OptionStats {
            option_id: o.id,
            text: o.text,
            total_votes: count,
            authenticated_votes: auth,
            unauthenticated_votes: count - auth,
            percentage: percentage(count, total_votes),
        })
        .collect();
    let free_text_responses = votes
        .iter()
        .filter_map(|v| {
            v.free_text_response.as_ref().map(|t| FreeTextEntry {
                response: t.clone(),
                is_authenticated: v.is_authenticated,
                created_at: v.created_at,
            })
        })
        .collect();
    PollResults {
        poll_id: poll.id,
        question_type: poll.question_type,
        total_votes,
        authenticated_votes,
        unauthenticated_votes: total_votes - authenticated_votes,
        option_stats,
        free_text_responses,
    }
}

pub async fn results(poll_id: Path<(i32,)>, db: Data<PgPool>) -> Result<HttpResponse, Error> {
    let poll_id = poll_id.into_inner().0;
    let poll = fetch_poll(&db, poll_id).await?;
    let mut conn = db.acquire().await?;
    let options: Vec<PollOption> = query_as("SELECT * FROM poll_options WHERE poll_id = $1 ORDER BY order_index")
        .bind(poll_id)
        .fetch_all(&mut conn)
        .await?;
    let votes: Vec<PollVote> = query_as("SELECT * FROM poll_votes WHERE poll_id = $1")
        .bind(poll_id)
        .fetch_all(&mut conn)
        .await?;
    let data = tally(&poll, options, &votes);
    Ok(HttpResponse::build(StatusCode::OK).json(Envelope::data(data)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::poll::{PollStatus, PollType};

    fn poll_fixture(question_type: QuestionType) -> Poll {
        Poll {
            id: 1,
            title: "Where should the new library branch go?".into(),
            description: None,
            poll_type: PollType::Simple,
            question_type,
            allow_user_submitted_answers: false,
            allow_unauthenticated_voting: true,
            allow_free_text_response: true,
            status: PollStatus::Active,
            creator_id: 7,
            article_id: None,
            location_id: None,
            starts_at: None,
            ends_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn option_fixture(id: i32, order_index: i32, text: &str) -> PollOption {
        PollOption {
            id,
            poll_id: 1,
            text: text.into(),
            photo_url: None,
            link_url: None,
            order_index,
            is_user_submitted: false,
            submitted_by_user_id: None,
            created_at: Utc::now(),
        }
    }

    fn vote_fixture(option_id: Option<i32>, ranking: Option<Vec<i32>>, free_text: Option<&str>, authenticated: bool) -> PollVote {
        PollVote {
            id: 0,
            poll_id: 1,
            user_id: authenticated.then_some(9),
            option_id,
            ranking,
            free_text_response: free_text.map(|t| t.to_string()),
            is_authenticated: authenticated,
            voter_identifier: (!authenticated).then(|| "fp".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_poll_has_zero_percentages() {
        let results = tally(
            &poll_fixture(QuestionType::SingleChoice),
            vec![option_fixture(10, 0, "North"), option_fixture(11, 1, "South")],
            &[],
        );
        assert_eq!(results.total_votes, 0);
        assert!(results.option_stats.iter().all(|s| s.percentage == 0.0 && s.total_votes == 0));
        // ties keep display order
        assert_eq!(results.option_stats[0].option_id, 10);
    }

    #[test]
    fn test_single_choice_counts_and_percentages() {
        let options = vec![option_fixture(10, 0, "North"), option_fixture(11, 1, "South"), option_fixture(12, 2, "East")];
        let votes = vec![
            vote_fixture(Some(11), None, None, true),
            vote_fixture(Some(11), None, None, false),
            vote_fixture(Some(10), None, None, false),
        ];
        let results = tally(&poll_fixture(QuestionType::SingleChoice), options, &votes);
        assert_eq!(results.total_votes, 3);
        assert_eq!(results.authenticated_votes, 1);
        assert_eq!(results.unauthenticated_votes, 2);
        // sorted by votes descending
        assert_eq!(results.option_stats[0].option_id, 11);
        assert_eq!(results.option_stats[0].total_votes, 2);
        assert_eq!(results.option_stats[0].authenticated_votes, 1);
        assert_eq!(results.option_stats[0].unauthenticated_votes, 1);
        assert_eq!(results.option_stats[0].percentage, 66.67);
        assert_eq!(results.option_stats[1].option_id, 10);
        assert_eq!(results.option_stats[1].percentage, 33.33);
        assert_eq!(results.option_stats[2].total_votes, 0);
        assert_eq!(results.option_stats[2].percentage, 0.0);
    }

    #[test]
    fn test_free_text_only_votes_count_toward_total() {
        let options = vec![option_fixture(10, 0, "North"), option_fixture(11, 1, "South")];
        let votes = vec![
            vote_fixture(Some(10), None, None, false),
            vote_fixture(None, None, Some("somewhere on the west side"), true),
        ];
        let results = tally(&poll_fixture(QuestionType::SingleChoice), options, &votes);
        assert_eq!(results.total_votes, 2);
        let per_option: i64 = results.option_stats.iter().map(|s| s.total_votes).sum();
        assert_eq!(per_option + 1, results.total_votes);
        assert_eq!(results.option_stats[0].percentage, 50.0);
        assert_eq!(results.free_text_responses.len(), 1);
        assert_eq!(results.free_text_responses[0].response, "somewhere on the west side");
        assert!(results.free_text_responses[0].is_authenticated);
    }

    #[test]
    fn test_ranked_ballots_count_first_preference() {
        let options = vec![option_fixture(10, 0, "North"), option_fixture(11, 1, "South"), option_fixture(12, 2, "East")];
        let votes = vec![
            vote_fixture(None, Some(vec![12, 10, 11]), None, false),
            vote_fixture(None, Some(vec![12, 11]), None, true),
            vote_fixture(None, Some(vec![10, 12]), None, false),
        ];
        let results = tally(&poll_fixture(QuestionType::RankedChoice), options, &votes);
        assert_eq!(results.option_stats[0].option_id, 12);
        assert_eq!(results.option_stats[0].total_votes, 2);
        assert_eq!(results.option_stats[0].percentage, 66.67);
        assert_eq!(results.option_stats[1].option_id, 10);
        assert_eq!(results.option_stats[1].total_votes, 1);
        assert_eq!(results.option_stats[2].option_id, 11);
        assert_eq!(results.option_stats[2].total_votes, 0);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(1, 8), 12.5);
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 5), 100.0);
    }
}
