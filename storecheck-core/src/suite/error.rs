use thiserror::Error;

use crate::browser::BrowserError;

pub type SuiteResult<T> = Result<T, SuiteError>;

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("no test case at index {0}")]
    UnknownCase(usize),
}

impl SuiteError {
    pub fn is_assertion(&self) -> bool {
        matches!(self, SuiteError::Assertion(_))
    }
}
