use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommentLensError {
    #[error("Configuration error: {0}")]
    Config(String),
}
