//! Versia federation for versia-rs.
//!
//! This crate implements the server-to-server protocol surface:
//!
//! - **Entities**: the wire representation of federation payloads
//! - **Client**: signed HTTP fetches and inbox deliveries
//! - **Resolver**: WebFinger + signed-fetch resolution of remote actors and
//!   instances, with DB-backed caching and single-flight collapsing
//! - **Dispatcher**: outbound delivery with retry classification
//! - **Processors**: idempotent handlers for inbound entities, invoked by
//!   the inbox workers
//! - **Handlers**: axum endpoints for the inbox, WebFinger, actor documents,
//!   and instance metadata

pub mod actor;
pub mod client;
pub mod delivery;
pub mod entity;
pub mod handler;
pub mod processor;
pub mod resolver;

pub use actor::ActorKind;
pub use client::{FederationClient, FetchedDocument};
pub use delivery::OutboundDispatcher;
pub use entity::{
    AcceptEntity, DeleteEntity, Entity, EntityBuilder, EntityKey, FollowEntity,
    InstanceMetadataEntity, InstanceSoftware, LikeEntity, NoteEntity, RejectEntity, UndoEntity,
    UserEntity,
};
pub use handler::{
    ActorState, InboxQueue, InboxRequest, InboxState, InstanceMetadataState, WebfingerState,
    actor_handler, inbox_handler, instance_metadata_handler, webfinger_handler,
};
pub use processor::{ProcessorContext, process_entity};
pub use resolver::{EntityResolver, InstanceSigner, ResolveFailure};
