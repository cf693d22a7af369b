use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
    #[display("no thresholds configured")]
    MissingThresholds,
    #[display("failed to write config file")]
    Write,
}

#[derive(Debug, Display, Error)]
pub enum FetchError {
    #[display("request to {source_name} failed")]
    Request { source_name: String },
    #[display("{source_name} returned HTTP {status}")]
    Status { source_name: String, status: u16 },
    #[display("failed to parse response from {source_name}")]
    ResponseParse { source_name: String },
    #[display("no data from {source_name} for {symbol}")]
    Unavailable { source_name: String, symbol: String },
    #[display("invalid price reading: {value}")]
    InvalidReading { value: f64 },
}

#[derive(Debug, Display, Error)]
pub enum NotifyError {
    #[display("request to {channel} failed")]
    Request { channel: String },
    #[display("{channel} returned HTTP {status}")]
    Status { channel: String, status: u16 },
    #[display("SMTP transport error")]
    Smtp,
    #[display("invalid email address")]
    Address,
    #[display("failed to build message")]
    Build,
}

#[derive(Debug, Display, Error)]
pub enum StateError {
    #[display("failed to read state document")]
    Read,
    #[display("failed to decode state document")]
    Decode,
    #[display("failed to encode state document")]
    Encode,
    #[display("failed to write state document")]
    Write,
}
