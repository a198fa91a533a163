pub type CelltraceResult<T> = Result<T, CelltraceError>;

#[derive(thiserror::Error, Debug)]
pub enum CelltraceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CelltraceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            CelltraceError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            CelltraceError::render("x")
                .to_string()
                .contains("render error:")
        );
        assert!(
            CelltraceError::export("x")
                .to_string()
                .contains("export error:")
        );
        assert!(
            CelltraceError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = CelltraceError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
