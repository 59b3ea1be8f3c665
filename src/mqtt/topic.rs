// ============================================================================
// MQTT Topic Pattern Matching
// ============================================================================
//
// Segment-level wildcards: `+` matches exactly one segment, `#` matches the
// rest of the topic (and must be the final pattern segment, per the MQTT
// spec).
//
// ============================================================================

/// Whether `topic` matches `pattern`
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_parts = pattern.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (pattern_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(p), Some(t)) if p == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// The device id is the second topic segment (devices/{id}/...)
pub fn device_id_from_topic(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    parts.next()?;
    parts.next().filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_level_wildcard() {
        assert!(topic_matches("devices/+/telemetry", "devices/sensor001/telemetry"));
        assert!(!topic_matches("devices/+/telemetry", "devices/sensor001/status"));
        assert!(!topic_matches("devices/+/status", "devices/sensor001/telemetry"));
        assert!(!topic_matches(
            "devices/+/telemetry",
            "devices/a/b/telemetry"
        ));
    }

    #[test]
    fn exact_match() {
        assert!(topic_matches("devices/register", "devices/register"));
        assert!(!topic_matches("devices/register", "devices/register/extra"));
        assert!(!topic_matches("devices/register/extra", "devices/register"));
    }

    #[test]
    fn multi_level_wildcard_matches_the_tail() {
        assert!(topic_matches("devices/#", "devices/sensor001/telemetry"));
        assert!(topic_matches("devices/#", "devices/register"));
        assert!(topic_matches("devices/+/commands/#", "devices/d1/commands/response"));
        assert!(!topic_matches("devices/#", "fleet/sensor001"));
    }

    #[test]
    fn device_id_extraction() {
        assert_eq!(
            device_id_from_topic("devices/sensor001/telemetry"),
            Some("sensor001")
        );
        assert_eq!(device_id_from_topic("devices/register"), Some("register"));
        assert_eq!(device_id_from_topic("devices"), None);
        assert_eq!(device_id_from_topic("devices//telemetry"), None);
    }
}
