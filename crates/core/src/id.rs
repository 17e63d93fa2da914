// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newtype identifiers, following the same thin-wrapper-over-String
//! convention used throughout the daemon for `AgentId`/`JobId`/etc.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(MachineId);
string_id!(ProjectId);
string_id!(SessionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner_string() {
        let id = MachineId::new("m1");
        assert_eq!(id.to_string(), "m1");
        assert_eq!(id.as_str(), "m1");
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = SessionId::new("s1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s1\"");
    }
}
