//! Error kinds surfaced by every forecast stage.
//!
//! Errors carry the stage or layer that raised them and nothing else; callers
//! decide whether to abort. No stage retries.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LulcError {
    #[error("class code {code} is not registered in the classification scheme")]
    UnknownClassCode { code: u32 },

    #[error("class code {max_code} does not fit under transition multiplier {multiplier}")]
    EncodingOverflow { max_code: u32, multiplier: u32 },

    #[error("transition code {code} is produced by both {first:?} and {second:?}")]
    TransitionCollision {
        code: u32,
        first: (u16, u16),
        second: (u16, u16),
    },

    #[error("{layer}: grid {found} does not match reference grid {expected}")]
    SpatialMismatch {
        layer: String,
        expected: String,
        found: String,
    },

    #[error("test set is empty; accuracy and kappa are undefined")]
    EmptyTestSet,

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("feature attribute `{attribute}` is missing ({context})")]
    MissingFeature { attribute: String, context: String },

    #[error("classification scheme must contain at least one class")]
    EmptyScheme,

    #[error("class code {code} is registered more than once")]
    DuplicateClassCode { code: u16 },

    #[error("colour `{color}` for class {code} is not a 6-digit hex string")]
    InvalidColor { code: u16, color: String },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("{stage} collaborator failed: {message}")]
    CollaboratorFailure { stage: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, LulcError>;

impl LulcError {
    pub fn collaborator(stage: &'static str, message: impl Into<String>) -> Self {
        Self::CollaboratorFailure { stage, message: message.into() }
    }

    pub fn missing(attribute: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingFeature { attribute: attribute.into(), context: context.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let e = LulcError::EncodingOverflow { max_code: 100, multiplier: 100 };
        assert_eq!(e.to_string(), "class code 100 does not fit under transition multiplier 100");

        let e = LulcError::collaborator("sampling", "budget exceeded");
        assert_eq!(e.to_string(), "sampling collaborator failed: budget exceeded");
    }
}
