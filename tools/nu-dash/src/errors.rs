use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DashError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("terminal error: {0}")]
    Terminal(String),
    #[error("ai client error: {0}")]
    AiClient(String),
    #[error("ai request failed: {0}")]
    Ai(String),
}

impl DashError {
    /// Errors that must end the session instead of being shown in the table.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AiClient(_) | Self::Terminal(_))
    }
}
