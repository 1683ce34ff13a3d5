//! Identity primitives: password hashing, opaque session tokens, and the
//! `Authorization: Token <key>` header contract.

use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use ulid::Ulid;

use crate::engine::Engine;
use crate::model::User;

/// The authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Ulid,
    pub username: String,
    pub is_superuser: bool,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            is_superuser: user.is_superuser,
        }
    }
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Salted SHA-256 in `salt$digest` hex form.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    format!("{}${}", hex::encode(salt), digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, expected)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    digest(&salt, password) == expected
}

/// Opaque 40-hex-char session token.
fn generate_token() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// In-memory token table. Tokens do not survive a restart — the WAL holds
/// users, not sessions.
#[derive(Default)]
pub struct SessionStore {
    tokens: DashMap<String, Ulid>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for the user. Each login gets its own token;
    /// logout revokes only the token it was called with.
    pub fn issue(&self, user_id: Ulid) -> String {
        let token = generate_token();
        self.tokens.insert(token.clone(), user_id);
        token
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    pub fn resolve(&self, token: &str) -> Option<Ulid> {
        self.tokens.get(token).map(|e| *e.value())
    }
}

/// Strip the `Token ` scheme from an Authorization header value.
pub fn token_from_header(header: &str) -> Option<&str> {
    let key = header.strip_prefix("Token ")?.trim();
    if key.is_empty() { None } else { Some(key) }
}

/// Resolve an Authorization header value to a principal. None means the
/// credentials are missing or no longer valid.
pub fn authenticate(engine: &Engine, sessions: &SessionStore, header: &str) -> Option<Principal> {
    let key = token_from_header(header)?;
    let user_id = sessions.resolve(key)?;
    engine.get_user(&user_id).map(|user| Principal::from(&user))
}
