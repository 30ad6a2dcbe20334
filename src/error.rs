use thiserror::Error;

/// Errors raised while compiling a cluster document.
///
/// Every variant is fatal to the run: the scripts are only meaningful as a
/// complete, internally consistent set.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A section or attribute has the wrong container shape (list vs mapping).
    #[error("{message}\n{usage}")]
    Structural {
        message: String,
        usage: &'static str,
    },

    /// Missing attribute, duplicate name, dangling reference, malformed value.
    #[error("{0}")]
    Validation(String),
}

impl CompileError {
    pub fn structural(message: impl Into<String>, usage: &'static str) -> Self {
        Self::Structural {
            message: message.into(),
            usage,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }
}

/// `bail!`-style early return with a [`CompileError::Validation`].
macro_rules! invalid {
    ($($arg:tt)*) => {
        return Err($crate::error::CompileError::Validation(format!($($arg)*)))
    };
}

pub(crate) use invalid;
