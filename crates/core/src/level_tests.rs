// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[test]
fn levels_are_strictly_ordered() {
    assert!(LogLevel::Debug < LogLevel::Info);
    assert!(LogLevel::Info < LogLevel::Warn);
    assert!(LogLevel::Warn < LogLevel::Error);
    assert!(LogLevel::Error < LogLevel::Critical);
}

#[parameterized(
    debug = { "debug", LogLevel::Debug },
    info = { "info", LogLevel::Info },
    warn = { "warn", LogLevel::Warn },
    error = { "error", LogLevel::Error },
    critical = { "critical", LogLevel::Critical },
)]
fn parse_roundtrips(s: &str, level: LogLevel) {
    assert_eq!(s.parse::<LogLevel>().unwrap(), level);
    assert_eq!(level.as_str(), s);
}

#[test]
fn unknown_level_is_rejected() {
    let err = "fatal".parse::<LogLevel>().unwrap_err();
    assert_eq!(err, UnknownLevel("fatal".to_string()));
}

#[test]
fn serde_uses_lowercase() {
    assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
    let back: LogLevel = serde_json::from_str("\"critical\"").unwrap();
    assert_eq!(back, LogLevel::Critical);
}

#[test]
fn serde_rejects_unknown_level() {
    assert!(serde_json::from_str::<LogLevel>("\"fatal\"").is_err());
}
