//! Startup-time venue registry.
//!
//! The venue selector string from configuration resolves here, once, before
//! any order is consumed. Unknown selectors fail startup; there is no
//! runtime symbol resolution.

use std::str::FromStr;
use std::sync::Arc;

use super::paper::PaperVenue;
use super::traits::VenueAdapter;
use crate::error::{BrokerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueKind {
    /// In-process simulated venue
    Paper,
}

impl VenueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
        }
    }
}

impl std::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VenueKind {
    type Err = BrokerError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paper" | "sim" => Ok(Self::Paper),
            other => Err(BrokerError::InvalidConfig(format!(
                "unknown venue '{}'; supported: paper",
                other
            ))),
        }
    }
}

/// Resolve the configured venue selector into an adapter.
///
/// External venue integrations implement [`VenueAdapter`] and register a
/// branch here; the gateway core never special-cases a venue elsewhere.
pub fn build_venue(selector: &str) -> Result<Arc<dyn VenueAdapter>> {
    match VenueKind::from_str(selector)? {
        VenueKind::Paper => Ok(Arc::new(PaperVenue::new())),
    }
}
