//! Guideline creation checks. Everything downstream assumes these hold.

use crate::errors::GuidelineError;
use crate::model::Guideline;

/// Marker in a guideline prompt replaced by the candidate completion.
pub const COMPLETION_PLACEHOLDER: &str = "{completion}";

pub fn validate(g: &Guideline) -> Result<(), GuidelineError> {
    if g.name.trim().is_empty() {
        return Err(GuidelineError::EmptyName);
    }
    let found = g.prompt.matches(COMPLETION_PLACEHOLDER).count();
    if found != 1 {
        return Err(GuidelineError::Placeholder {
            name: g.name.clone(),
            placeholder: COMPLETION_PLACEHOLDER,
            found,
        });
    }
    g.scale.validate().map_err(|source| GuidelineError::Scale {
        name: g.name.clone(),
        source,
    })
}

/// Validate a batch, also rejecting repeated names within it.
pub fn validate_all(guidelines: &[Guideline]) -> Result<(), GuidelineError> {
    for (i, g) in guidelines.iter().enumerate() {
        validate(g)?;
        if guidelines[..i].iter().any(|o| o.name == g.name) {
            return Err(GuidelineError::Duplicate(g.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ScaleError;
    use crate::scale::ScoringScale;

    fn g(name: &str, prompt: &str, scale: ScoringScale) -> Guideline {
        Guideline {
            name: name.into(),
            prompt: prompt.into(),
            category: String::new(),
            scale,
        }
    }

    #[test]
    fn placeholder_must_appear_exactly_once() {
        assert!(validate(&g("a", "Rate: {completion}", ScoringScale::Boolean)).is_ok());
        for (prompt, found) in [("Rate it", 0), ("{completion} vs {completion}", 2)] {
            assert_eq!(
                validate(&g("a", prompt, ScoringScale::Boolean)),
                Err(GuidelineError::Placeholder {
                    name: "a".into(),
                    placeholder: COMPLETION_PLACEHOLDER,
                    found
                })
            );
        }
    }

    #[test]
    fn invalid_scale_is_rejected_at_creation() {
        let err = validate(&g(
            "range",
            "{completion}",
            ScoringScale::Numeric {
                min_value: 10,
                max_value: 0,
            },
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            GuidelineError::Scale {
                source: ScaleError::InvertedRange { .. },
                ..
            }
        ));
    }

    #[test]
    fn duplicates_in_batch() {
        let batch = vec![
            g("x", "{completion}", ScoringScale::Boolean),
            g("x", "{completion}", ScoringScale::Percentage),
        ];
        assert_eq!(
            validate_all(&batch),
            Err(GuidelineError::Duplicate("x".into()))
        );
    }
}
