use std::fmt;

use serde::{Deserialize, Serialize};

use super::FAIR_USE_MESSAGES_KIND;

/// Category of action being counted.
///
/// Parsing never fails: strings that do not name a known kind are kept as
/// [`QuotaKind::Other`] and fall through to the default limit policy. Build
/// values through `From` so that known kinds always use their own variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QuotaKind {
    FairUseMessages,
    Other(String),
}

impl QuotaKind {
    pub fn as_str(&self) -> &str {
        match self {
            QuotaKind::FairUseMessages => FAIR_USE_MESSAGES_KIND,
            QuotaKind::Other(kind) => kind,
        }
    }
}

impl From<&str> for QuotaKind {
    fn from(value: &str) -> Self {
        match value.trim() {
            FAIR_USE_MESSAGES_KIND => QuotaKind::FairUseMessages,
            other => QuotaKind::Other(other.to_string()),
        }
    }
}

impl From<String> for QuotaKind {
    fn from(value: String) -> Self {
        QuotaKind::from(value.as_str())
    }
}

impl From<QuotaKind> for String {
    fn from(kind: QuotaKind) -> Self {
        match kind {
            QuotaKind::FairUseMessages => FAIR_USE_MESSAGES_KIND.to_string(),
            QuotaKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kind_parses_to_variant() {
        assert_eq!(QuotaKind::from("fair-use-messages"), QuotaKind::FairUseMessages);
        assert_eq!(QuotaKind::from(" fair-use-messages "), QuotaKind::FairUseMessages);
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let kind = QuotaKind::from("image-generations");
        assert_eq!(kind, QuotaKind::Other("image-generations".into()));
        assert_eq!(kind.to_string(), "image-generations");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&QuotaKind::FairUseMessages).unwrap();
        assert_eq!(json, "\"fair-use-messages\"");

        let kind: QuotaKind = serde_json::from_str("\"exports\"").unwrap();
        assert_eq!(kind.as_str(), "exports");
    }
}
