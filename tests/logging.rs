use tracing::level_filters::LevelFilter;

use procvisor::cli::LogLevel;
use procvisor::logging::{build_filter, parse_level_str};

#[test]
fn cli_level_wins_over_environment() {
    let filter = build_filter(Some(LogLevel::Warn), Some("trace"));
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
}

#[test]
fn bare_environment_level_is_used() {
    let filter = build_filter(None, Some(" Debug "));
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
}

#[test]
fn directive_strings_are_passed_through() {
    let filter = build_filter(None, Some("procvisor=trace,tokio=warn"));
    assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
}

#[test]
fn defaults_to_info() {
    assert_eq!(build_filter(None, None).max_level_hint(), Some(LevelFilter::INFO));
    assert_eq!(build_filter(None, Some("")).max_level_hint(), Some(LevelFilter::INFO));
}

#[test]
fn level_names() {
    assert_eq!(parse_level_str("WARNING"), Some(tracing::Level::WARN));
    assert_eq!(parse_level_str("loud"), None);
}
