//! Raw-text priority classification.

use serde::Serialize;

/// Priority class of a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Urgent-domain traffic, always admitted and drained first
    High,
    /// Everything else
    Normal,
}

impl Priority {
    /// Wire label
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
        }
    }
}

/// Classifies a line as high priority when its raw text contains any marker.
#[derive(Debug, Clone)]
pub struct PriorityClassifier {
    markers: Vec<String>,
}

impl PriorityClassifier {
    /// Classifier over `markers`, matched case-sensitively.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Priority of `raw`.
    pub fn classify(&self, raw: &str) -> Priority {
        if self.markers.iter().any(|m| raw.contains(m.as_str())) {
            Priority::High
        } else {
            Priority::Normal
        }
    }
}

impl Default for PriorityClassifier {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PRIORITY_MARKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers() {
        let classifier = PriorityClassifier::default();
        assert_eq!(
            classifier.classify(r#"{"type":"sensor_data","si":12.5}"#),
            Priority::High
        );
        assert_eq!(
            classifier.classify(r#"{"type":"sensor_data","pga":0.3}"#),
            Priority::High
        );
        assert_eq!(
            classifier.classify(r#"{"type":"event","kind":"earthquake"}"#),
            Priority::High
        );
        assert_eq!(
            classifier.classify(r#"{"type":"sensor_data","temp":21}"#),
            Priority::Normal
        );
    }

    #[test]
    fn test_key_markers_need_the_quoted_key() {
        let classifier = PriorityClassifier::default();
        // "si" as part of another key is not a seismic-intensity field.
        assert_eq!(
            classifier.classify(r#"{"type":"sensor_data","basis":1}"#),
            Priority::Normal
        );
    }
}
