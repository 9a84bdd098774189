//! Builder error taxonomy

/// Errors from data set construction and reassembly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetError {
    /// Payload or parameter outside the accepted limits
    BadInputData,
    /// The requested algorithm combination is not supported
    FeatureUnavailable,
    /// Signing failed
    SignatureFailed,
    /// A fragment's trailing digest does not match its contents
    CorruptFragment,
    /// A fragment number is absent from the set
    MissingFragment,
    /// A fragment number appears more than once
    DuplicateFragment,
}

impl core::fmt::Display for DataSetError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            DataSetError::BadInputData => "bad input data",
            DataSetError::FeatureUnavailable => "algorithm combination unavailable",
            DataSetError::SignatureFailed => "signing failed",
            DataSetError::CorruptFragment => "fragment digest mismatch",
            DataSetError::MissingFragment => "fragment missing",
            DataSetError::DuplicateFragment => "fragment duplicated",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for DataSetError {}
