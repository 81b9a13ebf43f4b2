//! `search_sources`: legal source lookup through the search collaborator

use super::{ToolContext, ToolOutput};
use crate::collaborators::{SearchHit, SearchQuery, SearchResults};
use serde::Deserialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchSourcesInput {
    pub query: String,
    #[serde(default, alias = "domainFilter")]
    pub domain_filter: Option<String>,
    #[serde(default, alias = "sourceType")]
    pub source_type: Option<String>,
}

pub(super) async fn run(input: &SearchSourcesInput, ctx: &ToolContext) -> ToolOutput {
    let query = input.query.trim();
    if query.is_empty() {
        return ToolOutput::error("search_sources needs a non-empty 'query'.");
    }

    let Some(search) = &ctx.collaborators().search else {
        return ToolOutput::error(
            "Legal source search is not available right now. Continue with the information \
             the user has provided and general knowledge of the applicable rules.",
        );
    };

    let request = SearchQuery {
        query: query.to_string(),
        domain_filter: input.domain_filter.clone().filter(|d| !d.trim().is_empty()),
        source_type: input.source_type.clone().filter(|s| !s.trim().is_empty()),
    };

    match search.search(&request).await {
        Ok(results) => ToolOutput::success(format_results(query, &results)),
        Err(e) => {
            tracing::warn!(error = %e, query = %query, "Search collaborator failed");
            ToolOutput::error(format!(
                "The search for \"{query}\" could not be completed ({e}). \
                 Continue without external sources or try a different query."
            ))
        }
    }
}

/// Official sources first, then the rest, then curated links
fn format_results(query: &str, results: &SearchResults) -> String {
    if results.results.is_empty() && results.official_links.is_empty() {
        return format!("No sources found for \"{query}\".");
    }

    let (official, other): (Vec<&SearchHit>, Vec<&SearchHit>) =
        results.results.iter().partition(|hit| hit.official);

    let mut out = format!("Sources for \"{query}\":\n");
    let mut n = 0;
    for (heading, hits) in [("Official sources", &official), ("Other sources", &other)] {
        if hits.is_empty() {
            continue;
        }
        let _ = write!(out, "\n{heading}:\n");
        for hit in hits {
            n += 1;
            let _ = writeln!(out, "{n}. {}\n   {}", hit.title, hit.url);
            if !hit.snippet.trim().is_empty() {
                let _ = writeln!(out, "   {}", hit.snippet.trim());
            }
        }
    }

    if !results.official_links.is_empty() {
        out.push_str("\nOfficial references:\n");
        for link in &results.official_links {
            let _ = writeln!(out, "- {}: {}", link.title, link.url);
        }
    }

    out.trim_end().to_string()
}
