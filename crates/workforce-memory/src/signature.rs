use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use workforce_core::Requirements;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "of", "on", "or", "our", "that", "the", "this", "to", "we", "with", "your",
];

/// Lowercase alphanumeric words longer than one character, minus stopwords.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Whether a signature describes a goal or a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Goal,
    Task,
}

impl ShapeKind {
    /// Marker token stored as the first shape token. It cannot collide with a
    /// tokenized word since `tokenize` strips `@`.
    pub fn marker(self) -> &'static str {
        match self {
            ShapeKind::Goal => "@goal",
            ShapeKind::Task => "@task",
        }
    }
}

/// The normalized shape of a goal or task.
///
/// Two pieces of work with the same words (in any order, any case, any
/// punctuation) share a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeSignature {
    pub kind: ShapeKind,
    /// Hex-encoded SHA-256 of the kind marker and the sorted token set.
    pub digest: String,
    /// Sorted, de-duplicated tokens. The kind marker comes first.
    pub tokens: Vec<String>,
}

impl ShapeSignature {
    pub fn from_text(kind: ShapeKind, text: &str) -> Self {
        let set: BTreeSet<String> = tokenize(text).into_iter().collect();
        let mut tokens = Vec::with_capacity(set.len() + 1);
        tokens.push(kind.marker().to_string());
        tokens.extend(set);

        let mut hasher = Sha256::new();
        hasher.update(tokens.join(" ").as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self {
            kind,
            digest,
            tokens,
        }
    }

    pub fn for_goal(description: &str, domain: Option<&str>) -> Self {
        let text = match domain {
            Some(domain) => format!("{domain} {description}"),
            None => description.to_string(),
        };
        Self::from_text(ShapeKind::Goal, &text)
    }

    /// Task shape: name, description, and required capabilities.
    pub fn for_task(name: &str, description: &str, requirements: &Requirements) -> Self {
        let mut text = format!("{name} {description}");
        for cap in &requirements.capabilities {
            text.push(' ');
            text.push_str(cap);
        }
        Self::from_text(ShapeKind::Task, &text)
    }

    /// Tokens without the kind marker.
    pub fn words(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or_default()
    }
}

/// Jaccard similarity of two token lists, treated as sets. Two empty lists
/// are identical.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let a: BTreeSet<&String> = a.iter().collect();
    let b: BTreeSet<&String> = b.iter().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stopwords_and_short_words() {
        assert_eq!(
            tokenize("Write the launch-post for a B2B audience!"),
            vec!["write", "launch", "post", "b2b", "audience"]
        );
    }

    #[test]
    fn test_digest_ignores_order_case_and_punctuation() {
        let a = ShapeSignature::from_text(ShapeKind::Task, "Draft launch post");
        let b = ShapeSignature::from_text(ShapeKind::Task, "post, LAUNCH: draft");
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.tokens, vec!["@task", "draft", "launch", "post"]);
    }

    #[test]
    fn test_kind_changes_digest() {
        let a = ShapeSignature::from_text(ShapeKind::Task, "draft post");
        let b = ShapeSignature::from_text(ShapeKind::Goal, "draft post");
        assert_ne!(a.digest, b.digest);
        assert_eq!(a.words(), b.words());
    }

    #[test]
    fn test_task_signature_includes_capabilities() {
        let req = Requirements::new().with_capability("copywriting");
        let sig = ShapeSignature::for_task("Draft", "landing page", &req);
        assert!(sig.tokens.contains(&"copywriting".to_string()));
    }

    #[test]
    fn test_jaccard() {
        let a: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let b: Vec<String> = vec!["b".into(), "c".into(), "d".into()];
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
        assert!((jaccard(&a, &a) - 1.0).abs() < 1e-9);
        assert!((jaccard(&[], &[]) - 1.0).abs() < 1e-9);
    }
}
