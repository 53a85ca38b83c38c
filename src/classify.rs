//! Failure classification for host and backend errors.
//!
//! Host SDKs and routers report failures as free-form strings or short codes.
//! Both protocols funnel those through [`classify`] so callers only ever see an
//! [`ErrorKind`] from the closed taxonomy plus a readable message.

use crate::error::{ErrorKind, QuestError};

/// Substring rules, checked in order. Earlier rules win: a message naming
/// both a shortfall and a rejection is a shortfall, and "insufficient
/// liquidity" is a funds problem as far as the caller can act on it.
const RULES: &[(&[&str], ErrorKind)] = &[
    (&["insufficient"], ErrorKind::InsufficientFunds),
    (&["allowance", "approve"], ErrorKind::AllowanceRequired),
    (&["slippage", "price", "too little received"], ErrorKind::SlippageExceeded),
    (&["liquidity"], ErrorKind::LiquidityInsufficient),
    (
        &["user_rejected", "rejected", "cancelled", "canceled", "denied"],
        ErrorKind::UserRejected,
    ),
    (&["timeout", "timed out"], ErrorKind::Timeout),
    (
        &["network", "connection", "fetch", "unreachable", "dns"],
        ErrorKind::NetworkError,
    ),
];

/// Map a raw failure signal onto the closed taxonomy.
pub fn classify(signal: &str) -> ErrorKind {
    let lowered = signal.to_lowercase();
    RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lowered.contains(n)))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

/// Classify a host error reply. The code is checked before the message since
/// host codes are the more precise signal.
pub fn classify_host_error(code: &str, message: Option<&str>) -> ErrorKind {
    match classify(code) {
        ErrorKind::Unknown => message.map(classify).unwrap_or(ErrorKind::Unknown),
        kind => kind,
    }
}

/// Build a caller-facing error from a raw signal, using `fallback` when the
/// signal matches no rule.
pub fn classified_error(signal: &str, fallback: ErrorKind) -> QuestError {
    let kind = match classify(signal) {
        ErrorKind::Unknown => fallback,
        kind => kind,
    };
    QuestError::from_kind(kind, signal)
}

/// Caller-facing error for a host error reply, using `fallback` when neither
/// the code nor the message matches a rule.
pub fn host_error(code: &str, message: Option<&str>, fallback: ErrorKind) -> QuestError {
    let kind = match classify_host_error(code, message) {
        ErrorKind::Unknown => fallback,
        kind => kind,
    };
    let text = match message {
        Some(message) => format!("{}: {}", code, message),
        None => code.to_string(),
    };
    QuestError::from_kind(kind, text)
}
