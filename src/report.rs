use crate::anomaly::AnomalySnapshot;
use crate::config::chains::ChainId;
use std::collections::HashSet;
use std::fmt::Write;

pub const CLEAN_REPORT_BODY: &str = "No anomalies found.\n";
/// Longest body a notification channel accepts (Discord embed description limit).
pub const MAX_BODY_CHARS: usize = 4_096;
const TRUNCATION_MARKER: &str = "\n...";

/// Rendered audit result of one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub chain: ChainId,
    pub title: String,
    pub body: String,
}

/// Title identifying a chain's report in the notification channel.
pub fn report_title(chain: ChainId) -> String {
    format!("⛓️ Chain: {}", chain.id())
}

/// Structural anomalies first, one per line, then one block per principal.
pub fn render(chain: ChainId, snapshot: &AnomalySnapshot) -> Report {
    let mut body = String::new();
    for anomaly in &snapshot.structural {
        let _ = writeln!(
            body,
            "{} - wrong {}: {}",
            anomaly.subject, anomaly.attribute, anomaly.observed
        );
    }
    for (principal, findings) in &snapshot.principals {
        if findings.is_empty() {
            continue;
        }
        let _ = write!(body, "\n👨‍🎤 **Actor: {principal}**\n");
        for finding in findings {
            let _ = writeln!(body, "{} - {} role", finding.contract, finding.capability);
        }
    }
    if body.is_empty() {
        body.push_str(CLEAN_REPORT_BODY);
    }
    Report {
        chain,
        title: report_title(chain),
        body,
    }
}

fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim_end).filter(|line| !line.is_empty())
}

/// A report is re-posted unless every line of the last posted one is still present in it.
pub fn needs_update(previous: Option<&str>, current: &str) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    let lines = content_lines(current).collect::<HashSet<_>>();
    content_lines(previous).any(|line| !lines.contains(line))
}

/// Cut `body` to [`MAX_BODY_CHARS`], marking the cut. Bodies within the limit are returned as-is.
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let keep = MAX_BODY_CHARS - TRUNCATION_MARKER.chars().count();
    let mut out = body.chars().take(keep).collect::<String>();
    out.push_str(TRUNCATION_MARKER);
    out
}
