use dor_types::SlotId;
use serde::{Deserialize, Serialize};

/// What to do with documents still in a legacy structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyStrategy {
    /// Rewrite legacy structures into the current one.
    #[default]
    Convert,
    /// Leave legacy structures as they are.
    Keep,
    /// Fail on any legacy structure.
    Reject,
}

/// Knobs handed to every [`ContentTransform`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub legacy_strategy: LegacyStrategy,
    /// Rewrite links that point at moved or renamed targets.
    pub repair_links: bool,
    /// Validate the result before returning it.
    pub validate: bool,
}

/// A document the transform could not migrate.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The document is not structurally what the transform expects.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The transformed document failed validation.
    #[error("validation failed: {0}")]
    Invalid(String),

    /// A legacy structure was found under [`LegacyStrategy::Reject`].
    #[error("legacy structure rejected: {0}")]
    Legacy(String),
}

/// Rewrites one object's content into the target format.
///
/// Must be deterministic: the same `(id, content, options)` always yields
/// the same bytes, so that two runs over one history agree.
pub trait ContentTransform: Send + Sync {
    fn transform(
        &self,
        id: SlotId,
        content: &[u8],
        options: &TransformOptions,
    ) -> Result<Vec<u8>, TransformError>;
}

impl<F> ContentTransform for F
where
    F: Fn(SlotId, &[u8], &TransformOptions) -> Result<Vec<u8>, TransformError> + Send + Sync,
{
    fn transform(
        &self,
        id: SlotId,
        content: &[u8],
        options: &TransformOptions,
    ) -> Result<Vec<u8>, TransformError> {
        self(id, content, options)
    }
}

/// Passes content through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTransform;

impl ContentTransform for IdentityTransform {
    fn transform(
        &self,
        _id: SlotId,
        content: &[u8],
        _options: &TransformOptions,
    ) -> Result<Vec<u8>, TransformError> {
        Ok(content.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_transforms() {
        let upper = |_: SlotId, content: &[u8], _: &TransformOptions| {
            Ok::<_, TransformError>(content.to_ascii_uppercase())
        };
        let out = upper
            .transform(SlotId::new(1), b"abc", &TransformOptions::default())
            .unwrap();
        assert_eq!(out, b"ABC");
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: TransformOptions = serde_json::from_str(r#"{"repair_links":true}"#).unwrap();
        assert!(options.repair_links);
        assert!(!options.validate);
        assert_eq!(options.legacy_strategy, LegacyStrategy::Convert);

        let reject: TransformOptions =
            serde_json::from_str(r#"{"legacy_strategy":"reject"}"#).unwrap();
        assert_eq!(reject.legacy_strategy, LegacyStrategy::Reject);
    }
}
