use thiserror::Error;

use crate::validate::Violations;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed diagram JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("diagram violates {count} constraint(s):\n{0}", count = .0.len())]
    Invalid(Violations),

    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
}

impl Error {
    pub fn violations(&self) -> Option<&Violations> {
        match self {
            Error::Invalid(violations) => Some(violations),
            _ => None,
        }
    }
}
