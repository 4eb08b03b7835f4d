// core/src/error.rs

use thiserror::Error;

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::session::SessionError;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    #[error("warehouse session error: {0}")]
    Session(#[from] SessionError),
}

impl From<std::io::Error> for DeployError {
    fn from(err: std::io::Error) -> Self {
        DeployError::Infrastructure(InfrastructureError::Io(err))
    }
}
