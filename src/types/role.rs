use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Membership role within a circle. Ordering is by authority, so
/// `role >= CircleRole::Moderator` reads as "moderator or better".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircleRole {
    Member,
    Moderator,
    Admin,
    Owner,
}

impl CircleRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircleRole::Member => "member",
            CircleRole::Moderator => "moderator",
            CircleRole::Admin => "admin",
            CircleRole::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "member" => Ok(CircleRole::Member),
            "moderator" => Ok(CircleRole::Moderator),
            "admin" => Ok(CircleRole::Admin),
            "owner" => Ok(CircleRole::Owner),
            other => Err(Error::InvalidRole(other.to_string())),
        }
    }

    pub fn at_least(&self, required: CircleRole) -> bool {
        *self >= required
    }
}

impl std::fmt::Display for CircleRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_ordering() {
        assert!(CircleRole::Owner > CircleRole::Admin);
        assert!(CircleRole::Admin > CircleRole::Moderator);
        assert!(CircleRole::Moderator > CircleRole::Member);
    }

    #[test]
    fn at_least_includes_self() {
        assert!(CircleRole::Moderator.at_least(CircleRole::Moderator));
        assert!(CircleRole::Owner.at_least(CircleRole::Member));
        assert!(!CircleRole::Member.at_least(CircleRole::Moderator));
    }

    #[test]
    fn parse_round_trip() {
        for role in [
            CircleRole::Member,
            CircleRole::Moderator,
            CircleRole::Admin,
            CircleRole::Owner,
        ] {
            assert_eq!(CircleRole::parse(role.as_str()).unwrap(), role);
        }
        assert!(CircleRole::parse("emperor").is_err());
    }
}
