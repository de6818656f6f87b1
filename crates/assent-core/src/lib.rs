pub mod config;
pub mod error;
pub mod preview;
pub mod types;

pub use config::AssentConfig;
pub use error::{AssentError, Result};
pub use preview::{sanitize, PreviewSanitizer, SanitizedPreview};
pub use types::*;
