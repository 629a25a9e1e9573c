use hex::ToHex;
use log::warn;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

use crate::error::Error;

pub static VOTER_SALT: &str = "VOTER_SALT";

/// Server-side secret mixed into anonymous voter fingerprints.
///
/// The salt is an explicit input rather than ambient state: handlers receive
/// it through app data. Rotating it invalidates all anonymous dedup history,
/// which is acceptable soft protection.
#[derive(Debug, Clone)]
pub struct VoterSalt(String);

impl VoterSalt {
    pub fn new(salt: impl Into<String>) -> Self {
        VoterSalt(salt.into())
    }

    /// Reads VOTER_SALT. In production a missing salt is a startup error;
    /// elsewhere a random one is generated, so anonymous dedup resets on
    /// every restart.
    pub fn from_env() -> Result<Self, Error> {
        match dotenv::var(VOTER_SALT) {
            Ok(salt) if !salt.is_empty() => Ok(VoterSalt(salt)),
            _ => {
                if crate::is_production() {
                    return Err(Error::Server(format!("environment variable {} must be set in production", VOTER_SALT)));
                }
                warn!("{} not set, generated a process-lifetime salt: anonymous vote dedup resets on restart", VOTER_SALT);
                Ok(VoterSalt(random_salt()))
            }
        }
    }
}

fn random_salt() -> String {
    thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect()
}

/// Stable pseudonymous identifier for an anonymous voter.
pub fn voter_identifier(ip: &str, salt: &VoterSalt) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(salt.0.as_bytes());
    hasher.finalize().encode_hex()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_same_ip_same_salt_is_stable() {
        let salt = VoterSalt::new("pepper");
        assert_eq!(voter_identifier("203.0.113.7", &salt), voter_identifier("203.0.113.7", &salt));
    }

    #[test]
    fn test_different_ips_differ() {
        let salt = VoterSalt::new("pepper");
        assert_ne!(voter_identifier("203.0.113.7", &salt), voter_identifier("203.0.113.8", &salt));
    }

    #[test]
    fn test_changing_salt_invalidates_history() {
        assert_ne!(
            voter_identifier("203.0.113.7", &VoterSalt::new("pepper")),
            voter_identifier("203.0.113.7", &VoterSalt::new("nutmeg"))
        );
    }

    #[test]
    fn test_identifier_is_hex_digest() {
        let id = voter_identifier("203.0.113.7", &VoterSalt::new("pepper"));
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_random_salt_length() {
        let salt = random_salt();
        assert_eq!(salt.len(), 32);
        assert_ne!(salt, random_salt());
    }
}
