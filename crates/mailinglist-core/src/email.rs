use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::InvalidArgument;

/// A normalized subscriber address.
///
/// Addresses are compared case-insensitively: surrounding whitespace is
/// trimmed and the whole address is lower-cased before it is stored or
/// looked up, so `Bob@Example.com` and ` bob@example.com` name the same row.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, InvalidArgument> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidArgument::EmptyEmail);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(InvalidArgument::MalformedEmail(trimmed.to_owned()));
        }
        match trimmed.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {}
            _ => return Err(InvalidArgument::MalformedEmail(trimmed.to_owned())),
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EmailAddress {
    type Err = InvalidArgument;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = InvalidArgument;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<EmailAddress> for String {
    fn from(email: EmailAddress) -> Self {
        email.0
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
