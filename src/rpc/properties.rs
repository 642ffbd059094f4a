//! MQTT5 property containers for the RPC request/response exchange.
//!
//! The policy reads `response_topic`, `correlation_data`, and
//! `content_type` off inbound request publishes and assembles the status,
//! statusMessage, content-type, and correlation-data properties of response
//! publishes. One [`PropertyBag`] is reused across responses; it must be
//! empty before assembly starts and is left empty after each submission.

use bytes::Bytes;

// ---------------------------------------------------------------------------
// User Properties
// ---------------------------------------------------------------------------

/// One user property pair on a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProperty {
    pub key: String,
    pub value: String,
}

/// User properties attached to a publish, in wire order.
///
/// The RPC exchange only ever appends pairs and reads the first value for a
/// key; duplicate keys are kept as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProperties(Vec<UserProperty>);

impl UserProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a property pair.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push(UserProperty {
            key: key.into(),
            value: value.into(),
        });
    }

    /// First value recorded for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|property| property.key == key)
            .map(|property| property.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserProperty> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

// ---------------------------------------------------------------------------
// Property Bag
// ---------------------------------------------------------------------------

/// The subset of MQTT 5.0 publish properties the RPC exchange uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyBag {
    /// Response topic for the request/response pattern.
    pub response_topic: Option<String>,
    /// Content type of the payload.
    pub content_type: Option<String>,
    /// Correlation data for the request/response pattern.
    pub correlation_data: Option<Bytes>,
    /// User properties.
    pub user_properties: UserProperties,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response_topic(mut self, topic: String) -> Self {
        self.response_topic = Some(topic);
        self
    }

    pub fn with_content_type(mut self, content_type: String) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_correlation_data(mut self, data: Bytes) -> Self {
        self.correlation_data = Some(data);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.response_topic.is_none()
            && self.content_type.is_none()
            && self.correlation_data.is_none()
            && self.user_properties.is_empty()
    }

    /// Empty the bag so it can be reused for the next publish.
    pub fn clear(&mut self) {
        self.response_topic = None;
        self.content_type = None;
        self.correlation_data = None;
        self.user_properties.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_properties_append_and_lookup() {
        let mut props = UserProperties::new();
        props.add("status", "200");
        props.add("statusMessage", "ok");

        assert_eq!(props.get("status"), Some("200"));
        assert_eq!(props.get("missing"), None);
        assert_eq!(props.len(), 2);
        let keys: Vec<&str> = props.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["status", "statusMessage"]);
    }

    #[test]
    fn test_user_properties_duplicate_keys_keep_wire_order() {
        let mut props = UserProperties::new();
        props.add("status", "200");
        props.add("status", "500");

        // first value wins on lookup, both stay on the wire
        assert_eq!(props.get("status"), Some("200"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_property_bag_builders() {
        let bag = PropertyBag::new()
            .with_response_topic("r/1".to_string())
            .with_content_type("application/json".to_string())
            .with_correlation_data(Bytes::from_static(b"corr"));

        assert_eq!(bag.response_topic.as_deref(), Some("r/1"));
        assert_eq!(bag.content_type.as_deref(), Some("application/json"));
        assert_eq!(bag.correlation_data, Some(Bytes::from_static(b"corr")));
        assert!(!bag.is_empty());
    }

    #[test]
    fn test_property_bag_clear() {
        let mut bag = PropertyBag::new().with_response_topic("r/1".to_string());
        bag.user_properties.add("status", "200");
        assert!(!bag.is_empty());

        bag.clear();
        assert!(bag.is_empty());
        assert!(bag.user_properties.is_empty());
    }
}
