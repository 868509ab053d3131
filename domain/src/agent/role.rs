//! Agent role value object

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Logical agent role in the pipeline (Value Object)
///
/// Each role is bound to exactly one model backend at a time. Plugins can
/// contribute additional roles, represented as [`AgentRole::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentRole {
    Architect,
    Coder,
    Reviewer,
    Validator,
    Chat,
    Custom(String),
}

impl AgentRole {
    pub fn as_str(&self) -> &str {
        match self {
            AgentRole::Architect => "architect",
            AgentRole::Coder => "coder",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Validator => "validator",
            AgentRole::Chat => "chat",
            AgentRole::Custom(name) => name,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            AgentRole::Architect => "Architect",
            AgentRole::Coder => "Coder",
            AgentRole::Reviewer => "Reviewer",
            AgentRole::Validator => "Validator",
            AgentRole::Chat => "Chat",
            AgentRole::Custom(name) => name,
        }
    }

    /// The built-in roles every configuration must bind
    pub fn builtin() -> [AgentRole; 5] {
        [
            AgentRole::Architect,
            AgentRole::Coder,
            AgentRole::Reviewer,
            AgentRole::Validator,
            AgentRole::Chat,
        ]
    }

    /// Sampling temperature used when the configuration does not set one
    pub fn default_temperature(&self) -> f32 {
        match self {
            AgentRole::Architect => 0.3,
            AgentRole::Coder => 0.1,
            AgentRole::Reviewer | AgentRole::Validator => 0.2,
            AgentRole::Chat | AgentRole::Custom(_) => 0.7,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, AgentRole::Custom(_))
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "architect" => AgentRole::Architect,
            "coder" => AgentRole::Coder,
            "reviewer" => AgentRole::Reviewer,
            "validator" => AgentRole::Validator,
            "chat" => AgentRole::Chat,
            _ => AgentRole::Custom(s.trim().to_string()),
        })
    }
}

impl Serialize for AgentRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        // FromStr is infallible
        Ok(s.parse().unwrap_or(AgentRole::Chat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builtin_roles() {
        for role in AgentRole::builtin() {
            let parsed: AgentRole = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
        let upper: AgentRole = "Coder".parse().unwrap();
        assert_eq!(upper, AgentRole::Coder);
    }

    #[test]
    fn test_unknown_role_is_custom() {
        let role: AgentRole = "game-designer".parse().unwrap();
        assert_eq!(role, AgentRole::Custom("game-designer".to_string()));
        assert!(role.is_custom());
        assert_eq!(role.to_string(), "game-designer");
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&AgentRole::Reviewer).unwrap();
        assert_eq!(json, "\"reviewer\"");
        let back: AgentRole = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AgentRole::Reviewer);
    }

    #[test]
    fn test_default_temperatures() {
        assert_eq!(AgentRole::Coder.default_temperature(), 0.1);
        assert_eq!(AgentRole::Chat.default_temperature(), 0.7);
    }
}
