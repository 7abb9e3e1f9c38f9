use crate::result::DeviceResult;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Response too short: expected {expected} bytes, got {actual} bytes")]
    TooShort { expected: usize, actual: usize },

    #[error("Device reported an error: {0}")]
    Device(DeviceResult),
}
