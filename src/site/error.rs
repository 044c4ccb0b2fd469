//! Public site rendering errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteError {
    /// A template failed to parse or is missing from the embedded set
    #[error("Template error: {0}")]
    Template(String),

    /// Rendering failed at runtime
    #[error("Render error in {name}: {message}")]
    Render { name: String, message: String },
}
