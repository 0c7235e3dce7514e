//! Domain event abstractions.

use chrono::{DateTime, Utc};

/// An immutable fact describing something that happened to an aggregate.
///
/// Events are never mutated after creation. The event type follows the
/// `<domain>.<entity>.<verb>` naming used on the wire (e.g. `stow.task.created`).
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the event type name (used for envelope routing).
    fn event_type(&self) -> &'static str;

    /// Returns when the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Serializes the event payload to JSON.
    fn to_payload(&self) -> serde_json::Value;
}

/// Returns `true` if `event_type` has the `<domain>.<entity>.<verb>` shape:
/// exactly three non-empty, dot-separated segments of lowercase ASCII
/// letters, digits, `-` or `_`.
#[must_use]
pub fn is_valid_event_type(event_type: &str) -> bool {
    let segments: Vec<&str> = event_type.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment.chars().all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'
                })
        })
}
