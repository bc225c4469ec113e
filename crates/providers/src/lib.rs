//! Model backend implementations for IVAN.
//!
//! All backends implement the `ivan_core::ModelBackend` trait.
//! [`router::build_from_config`] picks one from the `[backend]` section.

pub mod canned;
pub mod openai_compat;
pub mod router;

pub use canned::CannedBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use router::build_from_config;
