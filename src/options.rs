// src/options.rs

//! Region configuration options.

use std::str::FromStr;

use serde::Deserialize;

use crate::errors::DepschedError;

/// Order in which the static planner visits DAG vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Traversal {
    /// Submission order.
    Inorder,
    /// Breadth-first along out-edges; a vertex discovered before its
    /// in-neighbours is deferred behind them.
    Bfs,
    /// Depth-first with backtracking; a vertex is emitted once all its
    /// in-neighbours are emitted.
    Dfs,
}

impl Default for Traversal {
    fn default() -> Self {
        Traversal::Inorder
    }
}

impl FromStr for Traversal {
    type Err = DepschedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inorder" => Ok(Traversal::Inorder),
            "bfs" => Ok(Traversal::Bfs),
            "dfs" => Ok(Traversal::Dfs),
            other => Err(DepschedError::InvalidTraversal(other.to_string())),
        }
    }
}

/// Options accepted by [`with_region`](crate::region::with_region).
///
/// All fields have defaults, so embedders can also deserialize them from a
/// config section:
///
/// ```toml
/// static = true
/// traversal = "inorder"
/// aliasing = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RegionOptions {
    /// Plan at region close (`true`) or dispatch eagerly (`false`).
    #[serde(default = "default_true", rename = "static")]
    pub static_plan: bool,

    /// DAG walk order used by the static planner.
    #[serde(default)]
    pub traversal: Traversal,

    /// Analyse aliasing through memory spans (`true`) or compare whole
    /// values by identity only (`false`).
    #[serde(default = "default_true")]
    pub aliasing: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            static_plan: true,
            traversal: Traversal::default(),
            aliasing: true,
        }
    }
}

impl RegionOptions {
    /// Static planning with the given traversal.
    pub fn with_traversal(traversal: Traversal) -> Self {
        Self {
            traversal,
            ..Self::default()
        }
    }

    /// Eager dispatch; no planner run at region close.
    pub fn dynamic() -> Self {
        Self {
            static_plan: false,
            ..Self::default()
        }
    }

    /// Disable span-based aliasing analysis.
    pub fn without_aliasing(mut self) -> Self {
        self.aliasing = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_parses_known_values() {
        assert_eq!("inorder".parse::<Traversal>().unwrap(), Traversal::Inorder);
        assert_eq!(" BFS ".parse::<Traversal>().unwrap(), Traversal::Bfs);
        assert_eq!("dfs".parse::<Traversal>().unwrap(), Traversal::Dfs);
    }

    #[test]
    fn unknown_traversal_is_rejected() {
        let err = "sideways".parse::<Traversal>().unwrap_err();
        assert!(matches!(err, DepschedError::InvalidTraversal(s) if s == "sideways"));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: RegionOptions = serde_json::from_str("{}").unwrap();
        assert!(opts.static_plan);
        assert!(opts.aliasing);
        assert_eq!(opts.traversal, Traversal::Inorder);

        let opts: RegionOptions =
            serde_json::from_str(r#"{"static": false, "traversal": "dfs"}"#).unwrap();
        assert!(!opts.static_plan);
        assert_eq!(opts.traversal, Traversal::Dfs);
    }
}
