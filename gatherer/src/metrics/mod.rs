pub mod instance;
pub mod line_protocol;
pub mod raw;
pub mod record;

// Re-export the main types for easy access
pub use instance::*;
pub use raw::*;
pub use record::*;
