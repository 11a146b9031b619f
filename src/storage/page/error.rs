use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("invalid UTF-8 encoding")]
    InvalidUtf8,

    #[error("timestamp {0} is out of the representable range")]
    InvalidTimestamp(i64),
}
