use actix_web::dev::{Service, ServiceRequest, Transform};
use actix_web::HttpMessage;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Future, Ready};
use std::pin::Pin;

use crate::context::UserInfo;
use crate::error::Error;

pub static JWT_SECRET: &str = "JWT_SECRET";

#[derive(Debug, Deserialize, Serialize)]
pub struct Claim {
    pub user: String,
    pub exp: i64,
}

pub fn issue_token(secret: &[u8], claim: &Claim) -> Result<String, Error> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret);
    let token = encode(&header, claim, &key)?;
    Ok(token)
}

/// Resolves an optional `Authorization: Bearer <token>` header into a
/// [`UserInfo`] request extension. A missing header is not an error here —
/// routes that need a user express it through the `UserInfo` extractor.
pub struct Identity {
    secret: Vec<u8>,
}

impl Identity {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }
}

impl<S> Transform<S, ServiceRequest> for Identity
where
    S: Service<ServiceRequest> + 'static,
    S::Future: 'static,
    S::Error: Into<actix_web::Error>,
{
    type Error = actix_web::Error;
    type Response = S::Response;
    type Transform = IdentityService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityService {
            secret: self.secret.clone(),
            next_service: service,
        }))
    }
}

pub struct IdentityService<S> {
    secret: Vec<u8>,
    next_service: S,
}

impl<S> Service<ServiceRequest> for IdentityService<S>
where
    S: Service<ServiceRequest>,
    S::Future: 'static,
    S::Error: Into<actix_web::Error>,
{
    type Response = S::Response;
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    fn poll_ready(&self, ctx: &mut core::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.next_service.poll_ready(ctx).map_err(|e| e.into())
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(header) = req.headers().get("Authorization") {
            let token = match header.to_str() {
                Ok(value) => value.strip_prefix("Bearer ").unwrap_or(value).to_owned(),
                Err(_) => {
                    return Box::pin(async move { Err(Error::Unauthorized("malformed authorization header".into()).into()) });
                }
            };
            let key = DecodingKey::from_secret(&self.secret);
            match decode::<Claim>(&token, &key, &Validation::new(Algorithm::HS256)) {
                Err(_) => {
                    return Box::pin(async move { Err(Error::Unauthorized("invalid token".into()).into()) });
                }
                Ok(payload) => match payload.claims.user.parse::<i32>() {
                    Err(_) => {
                        return Box::pin(async move { Err(Error::Unauthorized("invalid token subject".into()).into()) });
                    }
                    Ok(id) => {
                        req.extensions_mut().insert(UserInfo { id });
                    }
                },
            }
        }
        let res_fut = self.next_service.call(req);
        Box::pin(async move {
            let resp = res_fut.await.map_err(|e| e.into())?;
            Ok(resp)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_issue_and_decode_token() {
        let secret = b"0123456789";
        let claim = Claim {
            user: "42".into(),
            exp: chrono::offset::Utc::now().timestamp() + 3600,
        };
        let token = issue_token(secret, &claim).unwrap();
        let decoded = decode::<Claim>(&token, &DecodingKey::from_secret(secret), &Validation::new(Algorithm::HS256)).unwrap();
        assert_eq!(decoded.claims.user, "42");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let claim = Claim {
            user: "42".into(),
            exp: chrono::offset::Utc::now().timestamp() + 3600,
        };
        let token = issue_token(b"0123456789", &claim).unwrap();
        assert!(decode::<Claim>(&token, &DecodingKey::from_secret(b"other secret"), &Validation::new(Algorithm::HS256)).is_err());
    }
}
