//! Grantees and ACL entries.
//!
//! An ACL entry is serialized the way the search index consumes it:
//! `{"Name": "...", "Type": "USER", "Access": "ALLOW"}`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Kind of identity an access grant refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GranteeType {
    User,
    Group,
    /// Any other kind reported by the source, kept upper-cased.
    Other(String),
}

impl GranteeType {
    /// Parses a source type name case-insensitively.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "group" => Self::Group,
            other => Self::Other(other.to_ascii_uppercase()),
        }
    }

    /// The upper-case form used in ACL entries.
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "USER",
            Self::Group => "GROUP",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for GranteeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for GranteeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GranteeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// An identity that can be granted access: the item owner or a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grantee {
    pub name: String,
    pub kind: GranteeType,
}

impl Grantee {
    pub fn new(name: impl Into<String>, kind: GranteeType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn user(login: &str) -> Self {
        Self::new(normalize_login(login), GranteeType::User)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, GranteeType::Group)
    }

    /// Builds a grantee from the source's `{type, login, name}` triple.
    ///
    /// Users are identified by their login with spaces replaced by `+`;
    /// every other kind by its display name verbatim.
    pub fn from_source(kind: &str, login: Option<&str>, name: Option<&str>) -> Option<Self> {
        let kind = GranteeType::parse(kind);
        match kind {
            GranteeType::User => login.map(Self::user),
            _ => name.map(|n| Self::new(n, kind)),
        }
    }

    /// An allow entry for this grantee.
    pub fn allow(&self) -> AclEntry {
        AclEntry::new(self.clone(), Access::Allow)
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

fn normalize_login(login: &str) -> String {
    login.replace(' ', "+")
}

/// Access decision carried by an ACL entry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Access {
    #[default]
    Allow,
    Deny,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
        }
    }

    /// Parses `ALLOW`/`DENY`, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("allow") {
            Some(Self::Allow)
        } else if s.eq_ignore_ascii_case("deny") {
            Some(Self::Deny)
        } else {
            None
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Allow => Self::Deny,
            Self::Deny => Self::Allow,
        }
    }
}

/// One (name, type, access) triple in a metadata document or the ACL feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AclEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub kind: GranteeType,
    #[serde(rename = "Access")]
    pub access: Access,
}

impl AclEntry {
    pub fn new(grantee: Grantee, access: Access) -> Self {
        Self {
            name: grantee.name,
            kind: grantee.kind,
            access,
        }
    }

    /// The de-duplication key: entries are unique per (name, type).
    pub fn grantee(&self) -> Grantee {
        Grantee::new(self.name.clone(), self.kind.clone())
    }

    /// Whether this entry refers to the same grantee as `other`.
    pub fn same_grantee(&self, other: &AclEntry) -> bool {
        self.name == other.name && self.kind == other.kind
    }
}
