use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no provider served a valid record for this address")]
    UnknownAddress,
}
