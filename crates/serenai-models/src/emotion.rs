//! Emotion analysis attached to assistant messages.
//!
//! The backend computes the analysis; the client only carries it to the
//! presentation layer. The inner JSON is kept verbatim so fields the
//! backend adds later survive a round trip.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Distress level above which a message is flagged in the chat view.
pub const DISTRESS_THRESHOLD: f64 = 0.7;

/// Opaque emotion analysis object.
///
/// # Examples
///
/// ```
/// use serenai_models::EmotionAnalysis;
///
/// let analysis = EmotionAnalysis::new(serde_json::json!({
///     "emotion": "sadness",
///     "confidence": 0.82,
///     "distress_level": 0.75,
/// }));
/// assert_eq!(analysis.emotion(), Some("sadness"));
/// assert!(analysis.is_distressed());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct EmotionAnalysis(Value);

impl EmotionAnalysis {
    /// Wrap a raw JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Dominant emotion label, if present.
    ///
    /// Reads `emotion`, falling back to the backend's `dominant_emotion`.
    pub fn emotion(&self) -> Option<&str> {
        ["emotion", "dominant_emotion"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_str))
    }

    /// Classifier confidence for [`Self::emotion`], if present.
    pub fn confidence(&self) -> Option<f64> {
        self.0.get("confidence").and_then(Value::as_f64)
    }

    /// Distress level in `0.0..=1.0`, if present.
    pub fn distress_level(&self) -> Option<f64> {
        self.0.get("distress_level").and_then(Value::as_f64)
    }

    /// True when the distress level exceeds [`DISTRESS_THRESHOLD`].
    pub fn is_distressed(&self) -> bool {
        self.distress_level()
            .is_some_and(|level| level > DISTRESS_THRESHOLD)
    }
}
