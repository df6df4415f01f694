use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemporaError {
    #[error("parse error: {message}")]
    Parse { message: String },
    #[error("missing value for temporal attribute {attribute}")]
    MissingValue { attribute: String },
    #[error("persistence error: {message}")]
    Persistence { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("cannot resolve attribute {attribute} against the supplied context")]
    InjectionKeyResolution { attribute: String },
    #[error("not found: {message}")]
    NotFound { message: String },
}

impl TemporaError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn missing_value(attribute: impl Into<String>) -> Self {
        Self::MissingValue {
            attribute: attribute.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unresolved_key(attribute: impl Into<String>) -> Self {
        Self::InjectionKeyResolution {
            attribute: attribute.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }
}

pub type TemporaResult<T> = Result<T, TemporaError>;

impl From<sea_orm::DbErr> for TemporaError {
    fn from(value: sea_orm::DbErr) -> Self {
        TemporaError::persistence(value.to_string())
    }
}
