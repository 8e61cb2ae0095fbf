//! Scope keys: the string tags role grants are attached to.
//!
//! Grammar: `global` | `workspace:<id>` | `project:<id>` |
//! `resource:<type>:<ref_id>` where `<type>` contains no colon.
//! Encoding and decoding are exact inverses; everything else is rejected.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const SCOPE_GLOBAL: &str = "global";

const PREFIX_WORKSPACE: &str = "workspace:";
const PREFIX_PROJECT: &str = "project:";
const PREFIX_RESOURCE: &str = "resource:";

/// Maximum accepted length of an encoded scope key.
const MAX_SCOPE_KEY_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeKeyError {
    #[error("invalid scope key")]
    InvalidKey,
    #[error("invalid resource type")]
    InvalidResourceType,
}

/// Authorization boundary a role grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Global,
    Workspace(i64),
    Project(i64),
    Resource { resource_type: String, ref_id: i64 },
}

impl ScopeKey {
    /// Build a resource scope. The resource type must be non-empty and
    /// must not contain a colon (it would break the encoding).
    pub fn resource(resource_type: &str, ref_id: i64) -> Result<Self, ScopeKeyError> {
        let rt = resource_type.trim();
        if rt.is_empty() || rt.contains(':') {
            return Err(ScopeKeyError::InvalidResourceType);
        }
        Ok(Self::Resource {
            resource_type: rt.to_string(),
            ref_id,
        })
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// The scope set a permission lookup must consider: the scope itself
    /// plus `global`, so globally granted roles apply everywhere.
    pub fn scopes_with_global(&self) -> Vec<String> {
        if self.is_global() {
            vec![SCOPE_GLOBAL.to_string()]
        } else {
            vec![self.to_string(), SCOPE_GLOBAL.to_string()]
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str(SCOPE_GLOBAL),
            Self::Workspace(id) => write!(f, "{PREFIX_WORKSPACE}{id}"),
            Self::Project(id) => write!(f, "{PREFIX_PROJECT}{id}"),
            Self::Resource {
                resource_type,
                ref_id,
            } => write!(f, "{PREFIX_RESOURCE}{resource_type}:{ref_id}"),
        }
    }
}

fn parse_id(s: &str) -> Result<i64, ScopeKeyError> {
    // Digits only: signs and embedded whitespace are rejected.
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ScopeKeyError::InvalidKey);
    }
    s.parse::<i64>().map_err(|_| ScopeKeyError::InvalidKey)
}

impl FromStr for ScopeKey {
    type Err = ScopeKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sk = s.trim();
        if sk.is_empty() || sk.len() > MAX_SCOPE_KEY_LEN {
            return Err(ScopeKeyError::InvalidKey);
        }

        if sk == SCOPE_GLOBAL {
            return Ok(Self::Global);
        }

        if let Some(rest) = sk.strip_prefix(PREFIX_WORKSPACE) {
            return Ok(Self::Workspace(parse_id(rest)?));
        }

        if let Some(rest) = sk.strip_prefix(PREFIX_PROJECT) {
            return Ok(Self::Project(parse_id(rest)?));
        }

        if let Some(rest) = sk.strip_prefix(PREFIX_RESOURCE) {
            let (rt, rid) = rest.split_once(':').ok_or(ScopeKeyError::InvalidKey)?;
            let rt = rt.trim();
            if rt.is_empty() || rid.contains(':') {
                return Err(ScopeKeyError::InvalidKey);
            }
            return Ok(Self::Resource {
                resource_type: rt.to_string(),
                ref_id: parse_id(rid)?,
            });
        }

        Err(ScopeKeyError::InvalidKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let cases = [
            ScopeKey::Global,
            ScopeKey::Workspace(5),
            ScopeKey::Project(42),
            ScopeKey::resource("doc", 100).unwrap(),
        ];
        for scope in cases {
            let encoded = scope.to_string();
            let decoded: ScopeKey = encoded.parse().expect("round trip failed");
            assert_eq!(decoded, scope);
        }
    }

    #[test]
    fn test_encoded_forms() {
        assert_eq!(ScopeKey::Global.to_string(), "global");
        assert_eq!(ScopeKey::Workspace(5).to_string(), "workspace:5");
        assert_eq!(ScopeKey::Project(9).to_string(), "project:9");
        assert_eq!(
            ScopeKey::resource("doc", 100).unwrap().to_string(),
            "resource:doc:100"
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        for bad in [
            "",
            "workspace:",
            "workspace:abc",
            "workspace:-1",
            "project:1.5",
            "resource:doc",
            "resource::5",
            "resource:a:b:5",
            "tenant:1",
            "GLOBAL",
        ] {
            assert!(bad.parse::<ScopeKey>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_decode_normalizes_leading_zeros() {
        // Digits with leading zeros are accepted; re-encoding yields the
        // canonical form.
        assert_eq!("workspace:007".parse::<ScopeKey>(), Ok(ScopeKey::Workspace(7)));
        assert_eq!(
            "workspace:007".parse::<ScopeKey>().unwrap().to_string(),
            "workspace:7"
        );
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let long = format!("workspace:{}", "9".repeat(200));
        assert_eq!(long.parse::<ScopeKey>(), Err(ScopeKeyError::InvalidKey));
    }

    #[test]
    fn test_resource_type_constraints() {
        assert_eq!(
            ScopeKey::resource("", 1),
            Err(ScopeKeyError::InvalidResourceType)
        );
        assert_eq!(
            ScopeKey::resource("a:b", 1),
            Err(ScopeKeyError::InvalidResourceType)
        );
        assert!(ScopeKey::resource(" doc ", 1).is_ok());
    }

    #[test]
    fn test_scopes_with_global() {
        assert_eq!(ScopeKey::Global.scopes_with_global(), vec!["global"]);
        assert_eq!(
            ScopeKey::Workspace(5).scopes_with_global(),
            vec!["workspace:5", "global"]
        );
        assert_eq!(
            ScopeKey::resource("doc", 7).unwrap().scopes_with_global(),
            vec!["resource:doc:7", "global"]
        );
    }
}
