use thiserror_no_std::Error;

use crate::bounds::NumericDomainError;
use crate::profile::ConfigError;
use crate::sample::InputError;
use crate::window::StoreError;

/// Why a sample could not be classified.
///
/// A rejected sample leaves the window store untouched and is never
/// published as a result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("invalid sample: {0}")]
    InputValidation(InputError),
    #[error("configuration error: {0}")]
    Configuration(ConfigError),
    #[error("sample is unclassifiable: {0}")]
    NumericDomain(NumericDomainError),
    #[error("window store unavailable: {0}")]
    StoreUnavailable(StoreError),
}

impl From<InputError> for DetectError {
    fn from(err: InputError) -> Self {
        Self::InputValidation(err)
    }
}

impl From<ConfigError> for DetectError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err)
    }
}

impl From<NumericDomainError> for DetectError {
    fn from(err: NumericDomainError) -> Self {
        Self::NumericDomain(err)
    }
}

impl From<StoreError> for DetectError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err)
    }
}
