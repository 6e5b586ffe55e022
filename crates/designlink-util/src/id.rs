//! ULID-based identifier generation with prefixes.
//!
//! Identifiers in designlink follow the pattern: `prefix_ulid`
//! For example: `ses_01hqxyz...` for managed sessions.
//!
//! A ULID packs a millisecond timestamp with 80 random bits, so two ids
//! generated in the same millisecond on different tasks still differ.

use ulid::Ulid;

/// Known identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    /// Sessions owned by the session manager.
    Session,
    /// Placeholder `mcp-session-id` values synthesized when a server omits one.
    LocalSession,
}

impl IdPrefix {
    /// Get the string prefix for this identifier type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Session => "ses",
            IdPrefix::LocalSession => "lcl",
        }
    }

    /// Parse a prefix from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ses" => Some(IdPrefix::Session),
            "lcl" => Some(IdPrefix::LocalSession),
            _ => None,
        }
    }
}

/// Identifier generation and parsing utilities.
pub struct Identifier;

impl Identifier {
    /// Generate a new ascending identifier (newer = larger).
    pub fn ascending(prefix: IdPrefix) -> String {
        Self::with_ulid(prefix, Ulid::new())
    }

    /// Generate an identifier with a specific ULID (for testing).
    pub fn with_ulid(prefix: IdPrefix, ulid: Ulid) -> String {
        format!("{}_{}", prefix.as_str(), ulid.to_string().to_lowercase())
    }

    /// Parse an identifier into its prefix and ULID parts.
    pub fn parse(id: &str) -> Option<(IdPrefix, Ulid)> {
        let (prefix, ulid) = id.split_once('_')?;
        let prefix = IdPrefix::parse(prefix)?;
        let ulid = Ulid::from_string(ulid).ok()?;
        Some((prefix, ulid))
    }

    /// Check if an identifier has the expected prefix.
    pub fn has_prefix(id: &str, prefix: IdPrefix) -> bool {
        id.strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }

    /// Generate a session manager id.
    pub fn session() -> String {
        Self::ascending(IdPrefix::Session)
    }

    /// Generate a placeholder transport session id.
    pub fn local_session() -> String {
        Self::ascending(IdPrefix::LocalSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ascending_id() {
        let id = Identifier::ascending(IdPrefix::Session);
        assert!(id.starts_with("ses_"));
        assert_eq!(id.len(), 30); // "ses_" (4) + ULID (26)
    }

    #[test]
    fn test_ascending_order() {
        let id1 = Identifier::session();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = Identifier::session();
        assert!(id1 < id2, "Ascending IDs should increase over time");
    }

    #[test]
    fn test_parse_id() {
        let id = Identifier::local_session();
        let (prefix, _ulid) = Identifier::parse(&id).unwrap();
        assert_eq!(prefix, IdPrefix::LocalSession);
    }

    #[test]
    fn test_has_prefix() {
        let id = Identifier::session();
        assert!(Identifier::has_prefix(&id, IdPrefix::Session));
        assert!(!Identifier::has_prefix(&id, IdPrefix::LocalSession));
        assert!(!Identifier::has_prefix("session", IdPrefix::Session));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Identifier::parse("nounderscore").is_none());
        assert!(Identifier::parse("xyz_01HQXYZ").is_none());
        assert!(Identifier::parse("ses_notaulid").is_none());
    }

    #[test]
    fn test_concurrent_placeholders_do_not_collide() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..250)
                        .map(|_| Identifier::local_session())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate placeholder id");
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
