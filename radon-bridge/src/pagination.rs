//! Log windowing: pure, synchronous transforms that turn an unbounded log
//! capture into a bounded, inspectable text window.
//!
//! Stages compose in a fixed precedence regardless of which parameters are
//! supplied: filter, then range-select, then head/tail truncation. Each
//! stage returns the transformed text plus a report of what it did, so the
//! final response can prepend one audit line describing the whole run.

use serde::{Deserialize, Serialize};

use crate::errors::BridgeError;
use crate::validators::compile_filter;

/// Head/tail truncation defaults: keep the first 50 and last 150 lines.
pub const KEEP_FIRST_N: usize = 50;
pub const KEEP_LAST_N: usize = 150;
/// Character budget applied as a final guard on every windowed payload.
pub const MAX_CHARS: usize = 50_000;

const DEFAULT_PAGE_LIMIT: usize = 100;

/// One applied stage and a human-readable description of its effect.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub effect: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    Auto,
    Paginate,
    Search,
}

impl WindowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowMode::Auto => "auto",
            WindowMode::Paginate => "paginate",
            WindowMode::Search => "search",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WindowParams {
    pub mode: WindowMode,
    pub filter: Option<String>,
    pub case_sensitive: bool,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub last: Option<usize>,
}

impl Default for WindowParams {
    fn default() -> Self {
        WindowParams {
            mode: WindowMode::Auto,
            filter: None,
            case_sensitive: false,
            offset: None,
            limit: None,
            last: None,
        }
    }
}

/// Counts relevant to the mode that ran, echoed to the caller verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct WindowMetadata {
    pub mode: &'static str,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct WindowResult {
    pub text: String,
    pub stages: Vec<StageReport>,
    pub metadata: WindowMetadata,
}

impl WindowResult {
    /// One composed audit line, e.g. `[matched 4 of 300, last 50 of 4 lines]`.
    pub fn summary_header(&self) -> String {
        if self.stages.is_empty() {
            return String::new();
        }
        let parts: Vec<&str> = self.stages.iter().map(|s| s.effect.as_str()).collect();
        format!("[{}]\n\n", parts.join(", "))
    }
}

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub text: String,
    pub matched: usize,
    pub total: usize,
}

/// Keep only lines matching `pattern`. An empty pattern is a no-op that
/// reports all lines as matched; an over-long or uncompilable pattern is a
/// validation error with zero lines matched.
pub fn filter_lines(
    text: &str,
    pattern: &str,
    case_sensitive: bool,
) -> Result<FilterOutcome, BridgeError> {
    let total = text.split('\n').count();
    if pattern.is_empty() {
        return Ok(FilterOutcome {
            text: text.to_string(),
            matched: total,
            total,
        });
    }
    let regex = compile_filter(pattern, case_sensitive)?;
    let filtered: Vec<&str> = text.split('\n').filter(|line| regex.is_match(line)).collect();
    Ok(FilterOutcome {
        matched: filtered.len(),
        total,
        text: filtered.join("\n"),
    })
}

/// Last N lines; a no-op if the text already has no more than N lines.
pub fn last_n_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() <= n {
        return text.to_string();
    }
    lines[lines.len() - n..].join("\n")
}

#[derive(Debug, Clone)]
pub struct RangeOutcome {
    pub text: String,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// Offset/limit slice over lines, order-preserving. An offset at or past
/// the end yields an empty window with `has_more = false`.
pub fn select_range(text: &str, offset: usize, limit: usize) -> RangeOutcome {
    let lines: Vec<&str> = text.split('\n').collect();
    let total = lines.len();
    let start = offset.min(total);
    let end = start.saturating_add(limit).min(total);
    RangeOutcome {
        text: lines[start..end].join("\n"),
        total,
        offset,
        limit,
        has_more: offset.saturating_add(limit) < total,
    }
}

#[derive(Debug, Clone)]
pub struct TruncateOutcome {
    pub text: String,
    pub total: usize,
    pub skipped: usize,
    pub summary: String,
}

/// Two-tier truncation: keep the first `first_n` and last `last_n` lines,
/// splicing a single marker line with the exact skipped count in between.
/// Returns the input unchanged (with a count-only summary) when it fits.
pub fn truncate_lines_with_summary(text: &str, first_n: usize, last_n: usize) -> TruncateOutcome {
    let lines: Vec<&str> = text.split('\n').collect();
    let total = lines.len();

    if total <= first_n + last_n {
        return TruncateOutcome {
            text: text.to_string(),
            total,
            skipped: 0,
            summary: format!("{total} lines"),
        };
    }

    let skipped = total - first_n - last_n;
    let mut out: Vec<&str> = Vec::with_capacity(first_n + last_n + 1);
    out.extend(&lines[..first_n]);
    let marker = format!("--- SKIPPED {skipped} LINES ---");
    out.push(&marker);
    out.extend(&lines[total - last_n..]);

    TruncateOutcome {
        text: out.join("\n"),
        total,
        skipped,
        summary: format!("showing {first_n} first + {last_n} last of {total} lines, skipped {skipped}"),
    }
}

/// Character-budget variant of head/tail truncation, for payloads where
/// line counting is not meaningful. Half the budget each side.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let half = max_chars / 2;
    let skipped = count - half * 2;
    let head: String = text.chars().take(half).collect();
    let tail: String = text.chars().skip(count - half).collect();
    format!("{head}\n\n[SKIPPED {skipped} CHARS]\n\n{tail}")
}

/// Run the full pipeline for one request.
///
/// Stage order is fixed (filter, range, truncate) no matter which
/// parameters are present; the mode decides which stages participate.
pub fn run_window(text: &str, params: &WindowParams) -> Result<WindowResult, BridgeError> {
    let total = text.split('\n').count();
    let mut stages: Vec<StageReport> = Vec::new();
    let mut matched: Option<usize> = None;
    let mut truncated = false;

    let mut output = text.to_string();

    match params.mode {
        WindowMode::Paginate => {
            let offset = params.offset.unwrap_or(0);
            let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
            let range = select_range(&output, offset, limit);
            stages.push(StageReport {
                stage: "range",
                effect: format!(
                    "lines {}..{} of {}{}",
                    range.offset,
                    range.offset.saturating_add(range.limit).min(range.total),
                    range.total,
                    if range.has_more { ", more available" } else { "" }
                ),
            });
            let meta = WindowMetadata {
                mode: params.mode.as_str(),
                total: range.total,
                matched: None,
                offset: Some(range.offset),
                limit: Some(range.limit),
                has_more: Some(range.has_more),
                truncated: false,
            };
            return Ok(finish(range.text, stages, meta));
        }
        WindowMode::Search => {
            let pattern = params.filter.as_deref().unwrap_or("");
            if pattern.is_empty() {
                return Err(BridgeError::InvalidArgument(
                    "search mode requires a filter pattern".to_string(),
                ));
            }
            let outcome = filter_lines(&output, pattern, params.case_sensitive)?;
            stages.push(StageReport {
                stage: "filter",
                effect: format!("matched {} of {}", outcome.matched, outcome.total),
            });
            matched = Some(outcome.matched);
            output = outcome.text;
        }
        WindowMode::Auto => {
            if let Some(pattern) = params.filter.as_deref() {
                let outcome = filter_lines(&output, pattern, params.case_sensitive)?;
                stages.push(StageReport {
                    stage: "filter",
                    effect: format!("matched {} of {}", outcome.matched, outcome.total),
                });
                matched = Some(outcome.matched);
                output = outcome.text;
            }
        }
    }

    // Range-select: `last` applies in auto mode only.
    if params.mode == WindowMode::Auto {
        if let Some(last) = params.last.filter(|&n| n > 0) {
            let before = output.split('\n').count();
            output = last_n_lines(&output, last);
            if before > last {
                stages.push(StageReport {
                    stage: "range",
                    effect: format!("last {last} of {before} lines"),
                });
            }
        }
    }

    // Head/tail truncation, skipped when the caller pinned an explicit tail.
    let explicit_tail = params.mode == WindowMode::Auto && params.last.is_some();
    if !explicit_tail {
        let outcome = truncate_lines_with_summary(&output, KEEP_FIRST_N, KEEP_LAST_N);
        if outcome.skipped > 0 {
            truncated = true;
        }
        stages.push(StageReport {
            stage: "truncate",
            effect: outcome.summary.clone(),
        });
        output = outcome.text;
    }

    let meta = WindowMetadata {
        mode: params.mode.as_str(),
        total,
        matched,
        offset: None,
        limit: None,
        has_more: None,
        truncated,
    };
    Ok(finish(output, stages, meta))
}

fn finish(text: String, mut stages: Vec<StageReport>, mut meta: WindowMetadata) -> WindowResult {
    let guarded = truncate_chars(&text, MAX_CHARS);
    if guarded.len() != text.len() {
        stages.push(StageReport {
            stage: "truncate",
            effect: format!("clipped to {MAX_CHARS} chars"),
        });
        meta.truncated = true;
    }
    WindowResult {
        text: guarded,
        stages,
        metadata: meta,
    }
}
