use std::env;
use std::sync::OnceLock;

static BROOK_PASS_STATS: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

pub(crate) fn pass_stats_enabled() -> bool {
    *BROOK_PASS_STATS.get_or_init(|| match env::var("BROOK_PASS_STATS") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}
