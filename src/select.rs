//! Tier-based engine family selection.
//!
//! The caller's tier is decided elsewhere (subscription and role checks);
//! this module only maps it to an engine family so routing can change
//! without touching the cascade or the engines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who is asking, as far as engine routing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallerTier {
    #[default]
    Free,
    Trial,
    Subscriber,
    Admin,
    SuperUser,
}

/// A named group of backends selected together for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineFamily {
    /// Multi-pass local recognizer stack with a remote per-page fallback.
    LocalStack,
    /// Whole-document premium cloud recognizer.
    PremiumCloud,
}

impl EngineFamily {
    pub fn label(self) -> &'static str {
        match self {
            EngineFamily::LocalStack => "local-stack",
            EngineFamily::PremiumCloud => "premium-cloud",
        }
    }
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pick the engine family for a caller tier.
pub fn select_family(tier: CallerTier) -> EngineFamily {
    match tier {
        CallerTier::Free | CallerTier::Trial => EngineFamily::LocalStack,
        CallerTier::Subscriber | CallerTier::Admin | CallerTier::SuperUser => {
            EngineFamily::PremiumCloud
        }
    }
}

impl FromStr for CallerTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "free" => Ok(CallerTier::Free),
            "trial" => Ok(CallerTier::Trial),
            "subscriber" | "premium" => Ok(CallerTier::Subscriber),
            "admin" => Ok(CallerTier::Admin),
            "super-user" | "superuser" => Ok(CallerTier::SuperUser),
            other => Err(format!("unknown caller tier '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_and_trial_use_local_stack() {
        assert_eq!(select_family(CallerTier::Free), EngineFamily::LocalStack);
        assert_eq!(select_family(CallerTier::Trial), EngineFamily::LocalStack);
    }

    #[test]
    fn paying_and_staff_use_premium() {
        for tier in [CallerTier::Subscriber, CallerTier::Admin, CallerTier::SuperUser] {
            assert_eq!(select_family(tier), EngineFamily::PremiumCloud);
        }
    }

    #[test]
    fn parse_tier() {
        assert_eq!("super_user".parse::<CallerTier>(), Ok(CallerTier::SuperUser));
        assert_eq!("Premium".parse::<CallerTier>(), Ok(CallerTier::Subscriber));
        assert!("guest".parse::<CallerTier>().is_err());
    }
}
