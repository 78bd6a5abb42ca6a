//! Application error type.
//!
//! Every fallible operation returns `AppError`, which carries:
//! - the process exit code (2 = config/input, 3 = insufficient data, 4 = runtime/external)
//! - the pipeline stage that failed, once known
//! - the raw error text surfaced to the operator

use std::fmt;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    stage: Option<&'static str>,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            stage: None,
            message: message.into(),
        }
    }

    /// Configuration or input problem (exit code 2).
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(2, message)
    }

    /// Not enough data to continue (exit code 3).
    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(3, message)
    }

    /// Runtime or external collaborator failure (exit code 4).
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(4, message)
    }

    /// Tag the error with the stage it escaped from. The innermost tag wins.
    pub fn in_stage(mut self, stage: &'static str) -> Self {
        if self.stage.is_none() {
            self.stage = Some(stage);
        }
        self
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn stage(&self) -> Option<&'static str> {
        self.stage
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "stage '{stage}' failed: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("stage", &self.stage)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_stage_tag_is_kept() {
        let err = AppError::runtime("boom").in_stage("merge").in_stage("run");
        assert_eq!(err.stage(), Some("merge"));
        assert_eq!(err.to_string(), "stage 'merge' failed: boom");
        assert_eq!(err.exit_code(), 4);
    }
}
