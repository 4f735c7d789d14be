use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisparityError {
    #[error("image sizes differ: left {left:?}, right {right:?}")]
    SizeMismatch { left: (u32, u32), right: (u32, u32) },
    #[error("empty image")]
    EmptyImage,
    #[error("invalid matcher parameters: {0}")]
    InvalidParams(String),
}
