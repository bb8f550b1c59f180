use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteType::Upvote => "upvote",
            VoteType::Downvote => "downvote",
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(VoteType::Upvote),
            "downvote" => Ok(VoteType::Downvote),
            other => Err(format!("\"{}\" is not a valid choice.", other)),
        }
    }
}

/// Which of the two token kinds a JWT was issued as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_type_parses_only_known_values() {
        assert_eq!("upvote".parse::<VoteType>(), Ok(VoteType::Upvote));
        assert_eq!("downvote".parse::<VoteType>(), Ok(VoteType::Downvote));
        assert_eq!(
            "Upvote".parse::<VoteType>(),
            Err("\"Upvote\" is not a valid choice.".to_string())
        );
    }

    #[test]
    fn vote_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&VoteType::Downvote).unwrap(), "\"downvote\"");
    }
}
