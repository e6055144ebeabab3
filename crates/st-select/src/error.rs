// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Views or buffers do not agree with the planned shape.
    #[error("Shape error: {0}")]
    Shape(String),
    /// `k` must satisfy `0 < k <= cols`.
    #[error("Invalid k: {k} (columns: {cols})")]
    InvalidK { k: usize, cols: usize },
    /// Neither the selection nor the index output was requested.
    #[error("at least one of selection/indices must be requested")]
    MissingOutput,
    /// An element count does not fit the internal counting type.
    #[error("Domain error: {0}")]
    Domain(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Device error: {0}")]
    Device(String),
}

pub fn shape(m: &str) -> Error {
    Error::Shape(m.to_string())
}
pub fn domain(m: &str) -> Error {
    Error::Domain(m.to_string())
}
pub fn config(m: &str) -> Error {
    Error::Config(m.to_string())
}
pub fn device(m: &str) -> Error {
    Error::Device(m.to_string())
}
