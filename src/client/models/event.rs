//! Change events delivered by the registry stream

use serde::{Deserialize, Serialize};

use super::record::{Family, RecordDraft, RecordPatch};

/// A single create/update/delete notification.
///
/// Wire shape: `{"type": "domain_update", "data": {...}}`. Each variant has its
/// own payload schema, so an unknown tag or a payload missing its key fails to
/// decode instead of being half-applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChangeEvent {
    DomainCreate(DomainCreated),
    DomainUpdate(DomainUpdated),
    DomainDelete(DomainDeleted),
    UrlCreate(UrlCreated),
    UrlUpdate(UrlUpdated),
    UrlDelete(UrlDeleted),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCreated {
    pub domain: String,
    #[serde(flatten)]
    pub draft: RecordDraft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainUpdated {
    pub domain: String,
    #[serde(flatten)]
    pub patch: RecordPatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDeleted {
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlCreated {
    pub url: String,
    #[serde(flatten)]
    pub draft: RecordDraft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlUpdated {
    pub url: String,
    #[serde(flatten)]
    pub patch: RecordPatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlDeleted {
    pub url: String,
}

impl ChangeEvent {
    /// Decode one stream frame
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::DomainCreate(_) => "domain_create",
            ChangeEvent::DomainUpdate(_) => "domain_update",
            ChangeEvent::DomainDelete(_) => "domain_delete",
            ChangeEvent::UrlCreate(_) => "url_create",
            ChangeEvent::UrlUpdate(_) => "url_update",
            ChangeEvent::UrlDelete(_) => "url_delete",
        }
    }

    pub fn family(&self) -> Family {
        match self {
            ChangeEvent::DomainCreate(_)
            | ChangeEvent::DomainUpdate(_)
            | ChangeEvent::DomainDelete(_) => Family::Domain,
            ChangeEvent::UrlCreate(_) | ChangeEvent::UrlUpdate(_) | ChangeEvent::UrlDelete(_) => {
                Family::Url
            }
        }
    }

    /// Key of the affected record
    pub fn key(&self) -> &str {
        match self {
            ChangeEvent::DomainCreate(e) => &e.domain,
            ChangeEvent::DomainUpdate(e) => &e.domain,
            ChangeEvent::DomainDelete(e) => &e.domain,
            ChangeEvent::UrlCreate(e) => &e.url,
            ChangeEvent::UrlUpdate(e) => &e.url,
            ChangeEvent::UrlDelete(e) => &e.url,
        }
    }
}
