//! Navigation decision returned by the navigation oracle.

use serde::{Deserialize, Serialize};

/// What to do with a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavAction {
    /// Visit the listed links before extracting this page
    Click,
    /// The page holds enough detail for extraction
    Extract,
}

/// Parsed oracle answer. `links` is non-empty only for `Click`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationDecision {
    pub action: NavAction,
    #[serde(default)]
    pub links: Vec<String>,
}

impl NavigationDecision {
    /// The fail-open default: extract, follow nothing.
    pub fn extract() -> Self {
        Self {
            action: NavAction::Extract,
            links: Vec::new(),
        }
    }

    pub fn click(links: Vec<String>) -> Self {
        if links.is_empty() {
            return Self::extract();
        }
        Self {
            action: NavAction::Click,
            links,
        }
    }

    pub fn wants_click(&self) -> bool {
        self.action == NavAction::Click && !self.links.is_empty()
    }
}

impl Default for NavigationDecision {
    fn default() -> Self {
        Self::extract()
    }
}
