use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid packet body length: {0} bytes (expected 10)")]
    InvalidBodyLength(usize),
    #[error("packet body exceeded {0} bytes without a footer")]
    BodyOverflow(usize),
    #[error("temperature {0} outside the valid telemetry band")]
    TemperatureOutOfRange(u16),
}
