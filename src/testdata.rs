//! Externalized run inputs.
//!
//! The search keyword lives in a data file next to the suite so runs can be
//! re-pointed at different inventory without a rebuild. Both a JSON document
//! with a `keyword` field and a plain text file (first non-empty line) are
//! accepted.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::errors::{FlowError, Result};

#[derive(Debug, Deserialize)]
struct KeywordFile {
    keyword: String,
}

pub fn load_search_keyword(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)?;

    let keyword = match serde_json::from_str::<KeywordFile>(&raw) {
        Ok(parsed) => parsed.keyword,
        Err(_) => raw
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
            .to_string(),
    };

    let keyword = keyword.trim().to_string();
    if keyword.is_empty() {
        return Err(FlowError::TestData(format!(
            "no keyword found in {}",
            path.display()
        )));
    }

    debug!(%keyword, "loaded search keyword");
    Ok(keyword)
}
