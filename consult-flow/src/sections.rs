//! Splits model markdown into titled sections, the unit of display and refinement.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Title used when a response without headers is accepted as a single section
pub const FALLBACK_SECTION_TITLE: &str = "Analysis";

// Only `#` and `##` start a section; deeper headers stay in the body.
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,2}\s+(\S.*)$").expect("valid header regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub content: String,
}

impl Section {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

fn header_title(line: &str) -> Option<&str> {
    HEADER
        .captures(line.trim_end_matches('\r'))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Parse markdown into ordered sections.
///
/// With `strict` set, text without any level-1/level-2 header yields no sections;
/// otherwise it becomes a single [`FALLBACK_SECTION_TITLE`] section. Text before
/// the first header is dropped whenever headers exist. Empty input always
/// yields an empty list and it is up to the caller to report it.
pub fn parse_sections(text: &str, strict: bool) -> Vec<Section> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let has_headers = text.lines().any(|line| header_title(line).is_some());
    if !has_headers {
        if strict {
            return Vec::new();
        }
        return vec![Section::new(FALLBACK_SECTION_TITLE, text.trim())];
    }

    let mut sections = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        match header_title(line) {
            Some(title) => {
                if let Some((title, body)) = current.take() {
                    sections.push(Section::new(title, body.join("\n").trim()));
                }
                current = Some((title.to_string(), Vec::new()));
            }
            None => {
                if let Some((_, body)) = current.as_mut() {
                    body.push(line);
                }
            }
        }
    }

    if let Some((title, body)) = current {
        sections.push(Section::new(title, body.join("\n").trim()));
    }

    sections
}

/// Render sections back to markdown with level-1 headers
pub fn render_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| format!("# {}\n\n{}", s.title, s.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
