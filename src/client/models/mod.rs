//! FishFish registry data models
//!
//! Records, credentials and stream change events, organized by concern.

mod auth;
mod event;
mod record;

pub use auth::{CreateSessionTokenRequest, Credential, Permission};
pub use event::{
    ChangeEvent, DomainCreated, DomainDeleted, DomainUpdated, UrlCreated, UrlDeleted, UrlUpdated,
};
pub use record::{Category, Domain, Family, Record, RecordDraft, RecordFields, RecordPatch, Url};
