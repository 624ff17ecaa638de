use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("no registry directory for chain {0}")]
    ChainNotConfigured(u64),
    #[error("unsupported chain id `{0}`")]
    UnknownChain(String),
    #[error("missing required configuration: {0}")]
    MissingConfig(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("registry source failure: {0}")]
    Registry(String),
    #[error("notification failure: {0}")]
    Notify(String),
}

impl AuditError {
    /// Configuration errors abort the affected chain only.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ChainNotConfigured(_)
                | Self::UnknownChain(_)
                | Self::MissingConfig(_)
                | Self::InvalidConfig(_)
        )
    }
}
