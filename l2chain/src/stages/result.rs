//! The result a stage returns for one file.

use crate::errors::StageError;

/// What the chain should do after a stage has run.
#[derive(Debug, Clone)]
pub enum StageResult {
    /// Proceed to the next enabled stage.
    Continue,
    /// Stop processing this file; it does not qualify for output.
    SkipFile(String),
    /// Stop processing this file; something went wrong.
    Fail(StageError),
}

impl StageResult {
    /// Creates a skip result.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::SkipFile(reason.into())
    }

    /// Creates a failure result.
    #[must_use]
    pub fn fail(error: impl Into<StageError>) -> Self {
        Self::Fail(error.into())
    }

    /// Returns true for `Continue`.
    #[must_use]
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Returns true for `SkipFile`.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::SkipFile(_))
    }

    /// Returns true for `Fail`.
    #[must_use]
    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }
}

impl From<StageError> for StageResult {
    fn from(err: StageError) -> Self {
        Self::Fail(err)
    }
}

/// Lets stage bodies use `?` and return `Result<StageResult, StageError>`.
impl From<Result<StageResult, StageError>> for StageResult {
    fn from(result: Result<StageResult, StageError>) -> Self {
        result.unwrap_or_else(Self::Fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FieldError;

    fn body(fail: bool) -> Result<StageResult, StageError> {
        if fail {
            Err(FieldError::Missing { key: "surface_type".into() })?;
        }
        Ok(StageResult::Continue)
    }

    #[test]
    fn test_result_flattening() {
        assert!(StageResult::from(body(false)).is_continue());

        let failed = StageResult::from(body(true));
        assert!(failed.is_fail());
        assert!(matches!(failed, StageResult::Fail(StageError::Field(_))));
    }

    #[test]
    fn test_skip_helper() {
        let result = StageResult::skip("wrong_mode");
        assert!(result.is_skip());
        assert!(matches!(result, StageResult::SkipFile(ref r) if r == "wrong_mode"));
    }
}
