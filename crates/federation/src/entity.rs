//! Versia wire entities.
//!
//! Every federation payload is a JSON object whose `type` field selects one
//! of the variants below. Unknown types deserialize to [`Entity::Unknown`]
//! so newer remote software never breaks parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use versia_common::IdGenerator;
use versia_db::entities::user;

/// An inbound or outbound federation entity, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Entity {
    Follow(FollowEntity),
    Accept(AcceptEntity),
    Reject(RejectEntity),
    Undo(UndoEntity),
    Note(NoteEntity),
    Like(LikeEntity),
    Delete(DeleteEntity),
    User(UserEntity),
    InstanceMetadata(InstanceMetadataEntity),
    /// Any type this software does not understand.
    #[serde(other)]
    Unknown,
}

impl Entity {
    /// The entity's canonical URI, when its type carries one.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::Follow(e) => Some(&e.uri),
            Self::Accept(e) => Some(&e.uri),
            Self::Reject(e) => Some(&e.uri),
            Self::Undo(e) => Some(&e.uri),
            Self::Note(e) => Some(&e.uri),
            Self::Like(e) => Some(&e.uri),
            Self::Delete(e) => Some(&e.uri),
            Self::User(e) => Some(&e.uri),
            Self::InstanceMetadata(_) | Self::Unknown => None,
        }
    }

    /// The declared type name, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Follow(_) => "Follow",
            Self::Accept(_) => "Accept",
            Self::Reject(_) => "Reject",
            Self::Undo(_) => "Undo",
            Self::Note(_) => "Note",
            Self::Like(_) => "Like",
            Self::Delete(_) => "Delete",
            Self::User(_) => "User",
            Self::InstanceMetadata(_) => "InstanceMetadata",
            Self::Unknown => "Unknown",
        }
    }
}

/// `author` follows `followee`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEntity {
    pub uri: String,
    pub author: String,
    pub followee: String,
    pub created_at: DateTime<Utc>,
}

/// `author` approves `follower`'s follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptEntity {
    pub uri: String,
    pub author: String,
    pub follower: String,
    pub created_at: DateTime<Utc>,
}

/// `author` declines `follower`'s follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectEntity {
    pub uri: String,
    pub author: String,
    pub follower: String,
    pub created_at: DateTime<Utc>,
}

/// `author` retracts a previously sent entity, referenced by URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoEntity {
    pub uri: String,
    pub author: String,
    pub undone: String,
    pub created_at: DateTime<Utc>,
}

/// A post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteEntity {
    pub uri: String,
    pub author: String,
    #[serde(default)]
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// `author` likes the entity at `liked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeEntity {
    pub uri: String,
    pub author: String,
    pub liked: String,
    pub created_at: DateTime<Utc>,
}

/// A tombstone for a deleted actor or note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteEntity {
    pub uri: String,
    /// Absent when an instance deletes on behalf of a gone actor.
    #[serde(default)]
    pub author: Option<String>,
    pub deleted_type: String,
    pub deleted: String,
    pub created_at: DateTime<Utc>,
}

/// An actor document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntity {
    pub uri: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
    pub public_key: EntityKey,
    pub inbox: String,
    #[serde(default)]
    pub shared_inbox: Option<String>,
    #[serde(default)]
    pub manually_approves_followers: bool,
    pub created_at: DateTime<Utc>,
}

/// An instance self-description, served at `/.well-known/versia`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceMetadataEntity {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub host: String,
    pub software: InstanceSoftware,
    pub public_key: EntityKey,
}

/// Software self-identification inside instance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSoftware {
    pub name: String,
    pub version: String,
}

/// An Ed25519 public key attached to an actor or instance document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityKey {
    /// The actor this key signs for; absent on instance-level keys.
    #[serde(default)]
    pub actor: Option<String>,
    pub algorithm: String,
    /// Base64-encoded raw 32-byte key.
    pub key: String,
}

impl EntityKey {
    /// An ed25519 key for the given actor.
    #[must_use]
    pub fn ed25519(actor: Option<String>, key: String) -> Self {
        Self {
            actor,
            algorithm: "ed25519".to_string(),
            key,
        }
    }
}

/// Builds outbound entities for local actors.
///
/// Follow, Accept, and Reject URIs are deterministic per ordered pair, so a
/// redelivered entity carries the same URI as the original and the receiving
/// side's idempotency keys line up.
#[derive(Clone)]
pub struct EntityBuilder {
    base_url: Url,
    id_gen: IdGenerator,
}

impl EntityBuilder {
    /// Create a builder rooted at this instance's public URL.
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self {
            base_url,
            id_gen: IdGenerator::new(),
        }
    }

    /// The canonical URI for a user. Local users are rooted at the base URL;
    /// remote users carry their own.
    #[must_use]
    pub fn actor_uri(&self, user: &user::Model) -> String {
        user.uri
            .clone()
            .unwrap_or_else(|| format!("{}users/{}", self.base_url, user.id))
    }

    /// The inbox a delivery for this user should target, preferring the
    /// shared inbox.
    #[must_use]
    pub fn inbox_for(&self, user: &user::Model) -> Option<String> {
        user.shared_inbox.clone().or_else(|| user.inbox.clone())
    }

    #[must_use]
    pub fn build_follow(&self, follower: &user::Model, followee: &user::Model) -> Entity {
        Entity::Follow(FollowEntity {
            uri: self.follow_uri(follower, followee),
            author: self.actor_uri(follower),
            followee: self.actor_uri(followee),
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn build_accept_follow(&self, subject: &user::Model, follower: &user::Model) -> Entity {
        Entity::Accept(AcceptEntity {
            uri: format!(
                "{}users/{}/accepts/{}",
                self.base_url, subject.id, follower.id
            ),
            author: self.actor_uri(subject),
            follower: self.actor_uri(follower),
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn build_reject_follow(&self, subject: &user::Model, follower: &user::Model) -> Entity {
        Entity::Reject(RejectEntity {
            uri: format!(
                "{}users/{}/rejects/{}",
                self.base_url, subject.id, follower.id
            ),
            author: self.actor_uri(subject),
            follower: self.actor_uri(follower),
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn build_undo_follow(&self, follower: &user::Model, followee: &user::Model) -> Entity {
        Entity::Undo(UndoEntity {
            uri: format!(
                "{}users/{}/undos/{}",
                self.base_url,
                follower.id,
                self.id_gen.generate()
            ),
            author: self.actor_uri(follower),
            undone: self.follow_uri(follower, followee),
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn build_note(&self, author: &user::Model, note_id: &str, content: Option<String>) -> Entity {
        Entity::Note(NoteEntity {
            uri: format!("{}notes/{note_id}", self.base_url),
            author: self.actor_uri(author),
            content,
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn build_like(&self, author: &user::Model, liked_uri: &str) -> Entity {
        Entity::Like(LikeEntity {
            uri: format!(
                "{}users/{}/likes/{}",
                self.base_url,
                author.id,
                self.id_gen.generate()
            ),
            author: self.actor_uri(author),
            liked: liked_uri.to_string(),
            created_at: Utc::now(),
        })
    }

    /// A tombstone for a deleted note.
    #[must_use]
    pub fn build_delete_note(&self, author: &user::Model, note_uri: &str) -> Entity {
        self.build_delete(Some(author), "Note", note_uri)
    }

    /// A tombstone for a deleted actor.
    #[must_use]
    pub fn build_delete_user(&self, deleted: &user::Model) -> Entity {
        let uri = self.actor_uri(deleted);
        self.build_delete(Some(deleted), "User", &uri)
    }

    /// The actor document served at the user's canonical URI.
    #[must_use]
    pub fn build_user(&self, user: &user::Model) -> Entity {
        let uri = self.actor_uri(user);
        Entity::User(UserEntity {
            public_key: EntityKey::ed25519(Some(uri.clone()), user.public_key.clone()),
            inbox: user
                .inbox
                .clone()
                .unwrap_or_else(|| format!("{}users/{}/inbox", self.base_url, user.id)),
            shared_inbox: user.shared_inbox.clone(),
            uri,
            username: user.username.clone(),
            display_name: user.name.clone(),
            bio: user.description.clone(),
            avatar: user.avatar_url.clone(),
            header: user.banner_url.clone(),
            manually_approves_followers: user.is_locked,
            created_at: user.created_at.to_utc(),
        })
    }

    /// This instance's metadata document.
    #[must_use]
    pub fn build_instance_metadata(
        &self,
        name: String,
        description: Option<String>,
        public_key: String,
    ) -> Entity {
        Entity::InstanceMetadata(InstanceMetadataEntity {
            name,
            description,
            host: self
                .base_url
                .host_str()
                .unwrap_or_default()
                .to_string(),
            software: InstanceSoftware {
                name: "versia-rs".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            public_key: EntityKey::ed25519(None, public_key),
        })
    }

    fn build_delete(&self, author: Option<&user::Model>, deleted_type: &str, deleted: &str) -> Entity {
        Entity::Delete(DeleteEntity {
            uri: format!("{}deletes/{}", self.base_url, self.id_gen.generate()),
            author: author.map(|a| self.actor_uri(a)),
            deleted_type: deleted_type.to_string(),
            deleted: deleted.to_string(),
            created_at: Utc::now(),
        })
    }

    fn follow_uri(&self, follower: &user::Model, followee: &user::Model) -> String {
        format!(
            "{}users/{}/follows/{}",
            self.base_url, follower.id, followee.id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> EntityBuilder {
        EntityBuilder::new(Url::parse("https://local.example/").unwrap())
    }

    fn local_user(id: &str) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: id.to_string(),
            username_lower: id.to_lowercase(),
            host: None,
            uri: None,
            inbox: None,
            shared_inbox: None,
            public_key: "cHVibGlj".to_string(),
            private_key: Some("cHJpdmF0ZQ==".to_string()),
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

    fn remote_user(id: &str) -> user::Model {
        let mut u = local_user(id);
        u.host = Some("remote.example".to_string());
        u.uri = Some(format!("https://remote.example/users/{id}"));
        u.inbox = Some(format!("https://remote.example/users/{id}/inbox"));
        u.private_key = None;
        u
    }

    #[test]
    fn test_unknown_type_parses_to_unknown() {
        let entity: Entity =
            serde_json::from_value(json!({"type": "Poll", "uri": "https://x.example/1"})).unwrap();
        assert!(matches!(entity, Entity::Unknown));
    }

    #[test]
    fn test_follow_wire_shape() {
        let entity = builder().build_follow(&local_user("alice"), &remote_user("bob"));
        let value = serde_json::to_value(&entity).unwrap();

        assert_eq!(value["type"], "Follow");
        assert_eq!(value["author"], "https://local.example/users/alice");
        assert_eq!(value["followee"], "https://remote.example/users/bob");
        assert_eq!(
            value["uri"],
            "https://local.example/users/alice/follows/bob"
        );
    }

    #[test]
    fn test_follow_uri_is_deterministic() {
        let b = builder();
        let alice = local_user("alice");
        let bob = remote_user("bob");

        let first = b.build_follow(&alice, &bob);
        let second = b.build_follow(&alice, &bob);
        assert_eq!(first.uri(), second.uri());
    }

    #[test]
    fn test_undo_references_the_follow_uri() {
        let b = builder();
        let alice = local_user("alice");
        let bob = remote_user("bob");

        let follow = b.build_follow(&alice, &bob);
        let undo = b.build_undo_follow(&alice, &bob);
        let Entity::Undo(undo) = undo else {
            panic!("expected Undo");
        };
        assert_eq!(Some(undo.undone.as_str()), follow.uri());
    }

    #[test]
    fn test_follow_round_trips_through_json() {
        let entity = builder().build_follow(&local_user("alice"), &remote_user("bob"));
        let value = serde_json::to_value(&entity).unwrap();
        let parsed: Entity = serde_json::from_value(value).unwrap();

        assert!(matches!(parsed, Entity::Follow(_)));
        assert_eq!(parsed.uri(), entity.uri());
    }

    #[test]
    fn test_user_entity_carries_key_and_lock_flag() {
        let mut alice = local_user("alice");
        alice.is_locked = true;

        let Entity::User(doc) = builder().build_user(&alice) else {
            panic!("expected User");
        };
        assert_eq!(doc.uri, "https://local.example/users/alice");
        assert_eq!(doc.public_key.algorithm, "ed25519");
        assert_eq!(doc.public_key.actor.as_deref(), Some(doc.uri.as_str()));
        assert!(doc.manually_approves_followers);
    }

    #[test]
    fn test_delete_user_tombstone() {
        let bob = remote_user("bob");
        let Entity::Delete(del) = builder().build_delete_user(&bob) else {
            panic!("expected Delete");
        };
        assert_eq!(del.deleted_type, "User");
        assert_eq!(del.deleted, "https://remote.example/users/bob");
    }
}
