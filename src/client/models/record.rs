//! Threat record models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};

/// The two independent record families held by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Domain,
    Url,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Domain, Family::Url];

    /// Registry collection path for this family
    pub fn path(&self) -> &'static str {
        match self {
            Family::Domain => "/domains",
            Family::Url => "/urls",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Domain => f.write_str("domain"),
            Family::Url => f.write_str("url"),
        }
    }
}

/// Threat classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Safe,
    Phishing,
    Malware,
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "safe" => Ok(Category::Safe),
            "phishing" => Ok(Category::Phishing),
            "malware" => Ok(Category::Malware),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Safe => "safe",
            Category::Phishing => "phishing",
            Category::Malware => "malware",
        };
        f.write_str(name)
    }
}

/// Fields shared by domain and URL records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    pub category: Category,

    #[serde(default)]
    pub description: String,

    /// Unix seconds when the record was created
    #[serde(default)]
    pub added: i64,

    /// Unix seconds when the record was last checked
    #[serde(default)]
    pub checked: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl RecordFields {
    /// Overwrite the fields a patch supplies and refresh `checked`.
    ///
    /// Empty strings count as absent. The patch's own `checked` wins over `now`
    /// when it carries one.
    pub fn apply(&mut self, patch: RecordPatch, now: i64) {
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(target) = patch.target {
            self.target = Some(target);
        }
        self.checked = patch.checked.filter(|checked| *checked > 0).unwrap_or(now);
    }
}

/// A domain threat record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub domain: String,

    #[serde(flatten)]
    pub fields: RecordFields,
}

/// A URL threat record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Url {
    pub url: String,

    #[serde(flatten)]
    pub fields: RecordFields,
}

/// Common access to the two record families
pub trait Record: Clone + Send + Sync + 'static {
    const FAMILY: Family;

    fn new(key: String, fields: RecordFields) -> Self;

    fn key(&self) -> &str;

    fn fields(&self) -> &RecordFields;

    fn fields_mut(&mut self) -> &mut RecordFields;
}

impl Record for Domain {
    const FAMILY: Family = Family::Domain;

    fn new(key: String, fields: RecordFields) -> Self {
        Self {
            domain: key,
            fields,
        }
    }

    fn key(&self) -> &str {
        &self.domain
    }

    fn fields(&self) -> &RecordFields {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut RecordFields {
        &mut self.fields
    }
}

impl Record for Url {
    const FAMILY: Family = Family::Url;

    fn new(key: String, fields: RecordFields) -> Self {
        Self { url: key, fields }
    }

    fn key(&self) -> &str {
        &self.url
    }

    fn fields(&self) -> &RecordFields {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut RecordFields {
        &mut self.fields
    }
}

/// Field values carried by a create event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub category: Category,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub target: Option<String>,
}

impl RecordDraft {
    /// Build full record fields, stamping both timestamps with `now`.
    pub fn into_fields(self, now: i64) -> RecordFields {
        RecordFields {
            category: self.category,
            description: self.description.unwrap_or_default(),
            added: now,
            checked: now,
            target: self.target,
        }
    }
}

/// Partial field values carried by an update event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<Category>,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub target: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<i64>,
}

/// Treat a missing, null or empty string as `None`
fn empty_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}
