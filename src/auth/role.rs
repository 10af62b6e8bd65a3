//! User roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Capability class of a user, fixed at signup.
///
/// The profile store persists roles as strings; anything that is not a
/// recognized role deserializes to [`Role::Unknown`], which never satisfies
/// a route requirement. There is no role-change flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Programmer,
    Company,
    /// Missing, malformed, or unresolvable role. Treated as "no real role"
    /// by every authorization check.
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Whether this role can stand in for a real capability class.
    pub fn is_known(self) -> bool {
        !matches!(self, Role::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Programmer => "programmer",
            Role::Company => "company",
            Role::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "programmer" => Role::Programmer,
            "company" => Role::Company,
            _ => Role::Unknown,
        })
    }
}
