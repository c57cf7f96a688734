use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What a user did to a loop. Like and save toggle; share and view append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Like,
    Save,
    Share,
    View,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Like => "like",
            InteractionKind::Save => "save",
            InteractionKind::Share => "share",
            InteractionKind::View => "view",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "like" => Ok(InteractionKind::Like),
            "save" => Ok(InteractionKind::Save),
            "share" => Ok(InteractionKind::Share),
            "view" => Ok(InteractionKind::View),
            other => Err(Error::BadRequest(format!("unknown interaction: {other}"))),
        }
    }

    /// Toggling kinds are unique per (user, loop); the rest accumulate.
    pub fn toggles(&self) -> bool {
        matches!(self, InteractionKind::Like | InteractionKind::Save)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Branch,
    Like,
    Gift,
    Event,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Branch => "branch",
            NotificationKind::Like => "like",
            NotificationKind::Gift => "gift",
            NotificationKind::Event => "event",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "branch" => Ok(NotificationKind::Branch),
            "like" => Ok(NotificationKind::Like),
            "gift" => Ok(NotificationKind::Gift),
            "event" => Ok(NotificationKind::Event),
            other => Err(Error::BadRequest(format!("unknown notification: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_kinds() {
        assert!(InteractionKind::Like.toggles());
        assert!(InteractionKind::Save.toggles());
        assert!(!InteractionKind::Share.toggles());
        assert!(!InteractionKind::View.toggles());
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(InteractionKind::parse("boost").is_err());
        assert!(NotificationKind::parse("poke").is_err());
    }
}
