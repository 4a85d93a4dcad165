//! Keyword emotion classifier and templated replies.
//!
//! Stands in for the backend's model pipeline. Output has the same shape
//! as the real analysis so clients exercise the same fields.

use std::collections::BTreeMap;

use serde::Serialize;

const CRISIS_INDICATORS: &[&str] = &[
    "suicide",
    "kill myself",
    "end it all",
    "don't want to live",
    "hurt myself",
    "self-harm",
    "ending my life",
    "die",
    "death",
];

const EMOTION_KEYWORDS: &[(&str, &[&str])] = &[
    ("sadness", &["sad", "depressed", "down", "blue", "miserable", "hopeless", "empty"]),
    ("anxiety", &["anxious", "worried", "nervous", "scared", "panic", "afraid", "fearful"]),
    ("anger", &["angry", "mad", "furious", "annoyed", "irritated", "frustrated"]),
    ("joy", &["happy", "joyful", "excited", "great", "amazing", "wonderful", "good"]),
    ("fear", &["terrified", "frightened", "scared", "afraid", "worried", "anxious"]),
    ("disgust", &["disgusted", "sick", "revolted", "repulsed"]),
    ("surprise", &["surprised", "shocked", "amazed", "astonished"]),
];

const NEGATIVE: &[&str] = &["sadness", "anger", "fear", "anxiety", "disgust"];
const POSITIVE: &[&str] = &["joy", "happiness", "love", "optimism"];

/// Distress reported when no emotional keyword matched.
const NEUTRAL_DISTRESS: f64 = 0.3;

const HIGH_DISTRESS: [&str; 3] = [
    "I hear that you're going through a really difficult time. Your feelings are valid, and it's important that you're reaching out.",
    "What you're experiencing sounds incredibly overwhelming. Let's take this one step at a time.",
    "I can sense the pain in your words. You don't have to carry this burden alone.",
];

const MODERATE_SUPPORT: [&str; 3] = [
    "It sounds like you're dealing with some challenging emotions right now. Can you tell me more about what's been weighing on you?",
    "I appreciate you sharing what's on your mind. These feelings you're describing are more common than you might think.",
    "Thank you for being open about how you're feeling. What has been the most difficult part of your day?",
];

const CONVERSATIONAL: [&str; 3] = [
    "I'm here to listen. How has your day been treating you?",
    "What's been on your mind lately? I'm here to support you however I can.",
    "How are you feeling right now? Sometimes it helps just to put feelings into words.",
];

const CRISIS_REPLY: &str = "I'm really concerned about what you've shared. You don't have to face this alone. \
Please reach out to a crisis line or emergency services right now; they are available around the clock.";

/// Emotion analysis in the backend's wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    /// Highest-scoring emotion, `neutral` if nothing matched.
    pub dominant_emotion: String,
    /// Share of negative intensity in `0.0..=1.0`.
    pub distress_level: f64,
    /// Score per matched emotion.
    pub emotions: BTreeMap<String, f64>,
    /// A crisis phrase was found.
    pub crisis_detected: bool,
    /// Which classifier produced the result.
    pub model_used: &'static str,
    /// Confidence in the dominant emotion.
    pub confidence: f64,
}

/// Classify `text`.
pub fn analyze(text: &str) -> Analysis {
    let lower = text.to_lowercase();

    if CRISIS_INDICATORS.iter().any(|k| lower.contains(k)) {
        return Analysis {
            dominant_emotion: "crisis".into(),
            distress_level: 1.0,
            emotions: BTreeMap::from([("crisis".to_string(), 1.0)]),
            crisis_detected: true,
            model_used: "crisis_detection",
            confidence: 0.95,
        };
    }

    let mut emotions = BTreeMap::new();
    for (emotion, keywords) in EMOTION_KEYWORDS {
        let hits = keywords.iter().filter(|k| lower.contains(*k)).count();
        if hits > 0 {
            #[allow(clippy::cast_precision_loss)]
            let score = (hits as f64 / keywords.len() as f64).min(1.0);
            emotions.insert((*emotion).to_string(), score);
        }
    }
    if emotions.is_empty() {
        emotions.insert("neutral".to_string(), 1.0);
    }

    let dominant_emotion = emotions
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or_else(|| "neutral".to_string(), |(name, _)| name.clone());
    let top = emotions.values().copied().fold(0.0, f64::max);

    Analysis {
        dominant_emotion,
        distress_level: distress_level(&emotions),
        emotions,
        crisis_detected: false,
        model_used: "rule_based",
        confidence: top * 0.7,
    }
}

fn distress_level(emotions: &BTreeMap<String, f64>) -> f64 {
    let sum = |names: &[&str]| -> f64 { names.iter().filter_map(|n| emotions.get(*n)).sum() };
    let negative = sum(NEGATIVE);
    let total = negative + sum(POSITIVE);
    if total == 0.0 {
        NEUTRAL_DISTRESS
    } else {
        (negative / total).clamp(0.0, 1.0)
    }
}

/// Assistant reply to `message` given its analysis.
pub fn reply(message: &str, analysis: &Analysis) -> String {
    if analysis.crisis_detected {
        return CRISIS_REPLY.to_string();
    }

    let templates = if analysis.distress_level > 0.7 {
        &HIGH_DISTRESS
    } else if analysis.distress_level > 0.4 {
        &MODERATE_SUPPORT
    } else {
        &CONVERSATIONAL
    };
    let mut reply = templates[message.chars().count() % templates.len()].to_string();

    match analysis.dominant_emotion.as_str() {
        "anxiety" | "fear" => {
            reply.push_str("\n\nWould you like to try a quick grounding exercise together?");
        }
        "sadness" => {
            reply.push_str("\n\nRemember that these feelings, while difficult, are temporary.");
        }
        "anger" => reply.push_str(
            "\n\nIt's completely valid to feel angry. Let's explore what might be behind these feelings.",
        ),
        _ => {}
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_text() {
        let a = analyze("I went for a walk");
        assert_eq!(a.dominant_emotion, "neutral");
        assert!((a.distress_level - NEUTRAL_DISTRESS).abs() < f64::EPSILON);
        assert!(!a.crisis_detected);
    }

    #[test]
    fn sadness_is_distress() {
        let a = analyze("I feel so sad and hopeless");
        assert_eq!(a.dominant_emotion, "sadness");
        assert!((a.distress_level - 1.0).abs() < f64::EPSILON);
        assert!(reply("I feel so sad and hopeless", &a).ends_with("are temporary."));
    }

    #[test]
    fn mixed_feelings_are_moderate() {
        // One joy hit against one sadness hit.
        let a = analyze("happy but sad");
        assert!(a.distress_level > 0.4 && a.distress_level < 0.7);
        assert!(MODERATE_SUPPORT.iter().any(|t| reply("happy but sad", &a).starts_with(t)));
    }

    #[test]
    fn crisis_phrases_win() {
        let a = analyze("Sometimes I want to end it all, I'm so sad");
        assert!(a.crisis_detected);
        assert_eq!(a.dominant_emotion, "crisis");
        assert_eq!(reply("", &a), CRISIS_REPLY);
    }

    #[test]
    fn wire_shape() {
        let v = serde_json::to_value(analyze("I am anxious")).unwrap();
        for key in ["dominant_emotion", "distress_level", "emotions", "crisis_detected", "model_used", "confidence"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }
}
