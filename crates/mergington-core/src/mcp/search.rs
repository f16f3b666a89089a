//! The `search_issues` MCP action.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Value, json};

use super::{McpClient, McpError};

/// MCP action name for issue search.
pub const SEARCH_ISSUES_ACTION: &str = "search_issues";

/// Issue sort key accepted by GitHub search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    #[default]
    Created,
    Updated,
    Comments,
    Reactions,
}

impl SearchSort {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchSort::Created => "created",
            SearchSort::Updated => "updated",
            SearchSort::Comments => "comments",
            SearchSort::Reactions => "reactions",
        }
    }

    /// Parse a sort key, treating anything unrecognized as `created`.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "updated" => SearchSort::Updated,
            "comments" => SearchSort::Comments,
            "reactions" => SearchSort::Reactions,
            _ => SearchSort::Created,
        }
    }
}

impl fmt::Display for SearchSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SearchSort {
    fn from(s: &str) -> Self {
        Self::parse_lenient(s)
    }
}

/// Result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("invalid sort order: {other:?} (expected \"asc\" or \"desc\")")),
        }
    }
}

/// Knobs for an issue search. The defaults are what the HTTP route sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub sort: SearchSort,
    pub order: SortOrder,
    pub per_page: u32,
    /// Omitted from the payload when `None`.
    pub page: Option<u32>,
}

impl SearchOptions {
    pub const DEFAULT_PER_PAGE: u32 = 10;

    pub fn with_sort(sort: SearchSort) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    /// Build the `parameters` object for a `search_issues` request.
    pub fn parameters(&self, query: &str) -> Value {
        let mut params = json!({
            "q": query,
            "sort": self.sort.as_str(),
            "order": self.order.as_str(),
            "per_page": self.per_page,
        });
        if let Some(page) = self.page {
            params["page"] = json!(page);
        }
        params
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            sort: SearchSort::default(),
            order: SortOrder::default(),
            per_page: Self::DEFAULT_PER_PAGE,
            page: None,
        }
    }
}

impl McpClient {
    /// Search issues with the default order and page size.
    pub async fn search_issues(&self, query: &str, sort: SearchSort) -> Result<Value, McpError> {
        self.search_issues_with(query, &SearchOptions::with_sort(sort))
            .await
    }

    /// Search issues with explicit options.
    pub async fn search_issues_with(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Value, McpError> {
        self.execute(SEARCH_ISSUES_ACTION, options.parameters(query))
            .await
    }
}
