use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Category assigned to an inbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Bank,
    Automated,
    Meeting,
    NeedsAction,
    FollowUp,
    Newsletter,
}

impl Label {
    #[cfg(test)]
    pub const ALL: [Label; 6] = [
        Label::Bank,
        Label::Automated,
        Label::Meeting,
        Label::NeedsAction,
        Label::FollowUp,
        Label::Newsletter,
    ];

    pub fn display(&self) -> &'static str {
        match self {
            Label::Bank => "Bank",
            Label::Automated => "Automated",
            Label::Meeting => "Meeting",
            Label::NeedsAction => "Needs Action",
            Label::FollowUp => "Follow Up",
            Label::Newsletter => "Newsletter",
        }
    }

    /// Action emphasized when no backend suggestion is available.
    pub fn default_action(&self) -> SuggestedAction {
        match self {
            Label::Meeting | Label::NeedsAction | Label::FollowUp => SuggestedAction::Reply,
            Label::Bank | Label::Automated | Label::Newsletter => SuggestedAction::Archive,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedAction {
    Archive,
    Reply,
    Forward,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedAction::Archive => "archive",
            SuggestedAction::Reply => "reply",
            SuggestedAction::Forward => "forward",
        }
    }

    pub fn shortcut(&self) -> char {
        match self {
            SuggestedAction::Archive => 'e',
            SuggestedAction::Reply => 'r',
            SuggestedAction::Forward => 'f',
        }
    }
}

impl fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestedAction {
    type Err = String;

    /// Accepts the bare token with surrounding whitespace, quotes or a trailing period.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let token = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
            .to_ascii_lowercase();
        match token.as_str() {
            "archive" => Ok(SuggestedAction::Archive),
            "reply" => Ok(SuggestedAction::Reply),
            "forward" => Ok(SuggestedAction::Forward),
            _ => Err(raw.trim().to_string()),
        }
    }
}

/// Result of classifying one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub label: Label,
    pub suggestion: Option<SuggestedAction>,
    /// Name of the rule that produced the label.
    pub rule: &'static str,
}
