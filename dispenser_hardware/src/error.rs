use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("relay pin {0} is not available")]
    PinUnavailable(u8),
    #[error("injected relay fault: {0}")]
    Injected(String),
}

pub type Result<T> = std::result::Result<T, HwError>;
