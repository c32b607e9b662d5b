use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Cli(#[from] clap::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),
    #[error("IMAP error: {0}")]
    Imap(String),
    #[error("could not parse message: {0}")]
    Mail(#[from] mailparse::MailParseError),
    #[error("could not parse date '{0}'")]
    InvalidDate(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
