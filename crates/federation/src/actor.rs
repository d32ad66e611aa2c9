//! Local/remote actor views.
//!
//! Signing requires a private key that only local actors have. Splitting the
//! row into a tagged view makes "sign with a remote actor's key" a type
//! error instead of a runtime surprise.

use ed25519_dalek::{SigningKey, VerifyingKey};
use versia_common::{AppError, AppResult, crypto};
use versia_db::entities::user;

/// A user row paired with its parsed key material.
pub enum ActorKind {
    /// An actor homed on this instance, able to sign.
    Local {
        user: user::Model,
        signing_key: SigningKey,
    },
    /// An actor homed elsewhere, only able to be verified.
    Remote {
        user: user::Model,
        verifying_key: VerifyingKey,
    },
}

impl ActorKind {
    /// Classify a user row and parse its keys.
    pub fn from_model(user: user::Model) -> AppResult<Self> {
        if user.is_local() {
            let encoded = user.private_key.as_deref().ok_or_else(|| {
                AppError::Internal(format!("Local user {} has no private key", user.id))
            })?;
            let signing_key = crypto::parse_signing_key(encoded)?;
            Ok(Self::Local { user, signing_key })
        } else {
            let verifying_key = crypto::parse_verifying_key(&user.public_key)?;
            Ok(Self::Remote {
                user,
                verifying_key,
            })
        }
    }

    /// The underlying user row.
    #[must_use]
    pub const fn user(&self) -> &user::Model {
        match self {
            Self::Local { user, .. } | Self::Remote { user, .. } => user,
        }
    }

    /// The key that verifies this actor's signatures.
    pub fn verifying_key(&self) -> AppResult<VerifyingKey> {
        match self {
            Self::Local { signing_key, .. } => Ok(signing_key.verifying_key()),
            Self::Remote { verifying_key, .. } => Ok(*verifying_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use versia_common::crypto::generate_keypair;

    fn base_user() -> user::Model {
        user::Model {
            id: "u1".to_string(),
            username: "alice".to_string(),
            username_lower: "alice".to_string(),
            host: None,
            uri: None,
            inbox: None,
            shared_inbox: None,
            public_key: String::new(),
            private_key: None,
            name: None,
            description: None,
            avatar_url: None,
            banner_url: None,
            is_locked: false,
            is_suspended: false,
            followers_count: 0,
            following_count: 0,
            last_fetched_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[test]
    fn test_local_actor_gets_signing_key() {
        let keypair = generate_keypair();
        let mut user = base_user();
        user.public_key = keypair.public_key.clone();
        user.private_key = Some(keypair.private_key.clone());

        let actor = ActorKind::from_model(user).unwrap();
        assert!(matches!(actor, ActorKind::Local { .. }));
    }

    #[test]
    fn test_local_actor_without_private_key_fails() {
        let keypair = generate_keypair();
        let mut user = base_user();
        user.public_key = keypair.public_key;

        assert!(ActorKind::from_model(user).is_err());
    }

    #[test]
    fn test_remote_actor_parses_public_key() {
        let keypair = generate_keypair();
        let mut user = base_user();
        user.host = Some("remote.example".to_string());
        user.uri = Some("https://remote.example/users/u1".to_string());
        user.public_key = keypair.public_key;

        let actor = ActorKind::from_model(user).unwrap();
        assert!(matches!(actor, ActorKind::Remote { .. }));
        assert!(actor.verifying_key().is_ok());
    }
}
