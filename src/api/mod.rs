pub mod client;
pub mod resources;

pub use client::{endpoint, error_detail, ApiClient};
pub use resources::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{detail}")]
    Backend { status: u16, detail: String },
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Backend { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
