//! Google Gemini `generateContent` client.
//!
//! A thin wrapper over the public REST endpoint that authenticates with an
//! API key. Only non-streaming text generation is supported.
//!
//! # Example
//!
//! ```rust,no_run
//! use gemini_rest::{Client, Content, GenerationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("api-key")?;
//!     let model = client.model("gemini-1.5-flash")
//!         .with_generation_config(GenerationConfig::default());
//!
//!     let text = model
//!         .generate(Some("You are terse."), &[Content::user("Hello")])
//!         .await?;
//!     println!("{text}");
//!     Ok(())
//! }
//! ```

mod client;
mod completion;
mod error;
mod types;

pub use client::Client;
pub use completion::GenerativeModel;
pub use error::GeminiError;
pub use types::*;

/// Commonly used Gemini model identifiers
pub mod models {
    /// Gemini 1.5 Flash - fast, inexpensive
    pub const GEMINI_1_5_FLASH: &str = "gemini-1.5-flash";
    /// Gemini 1.5 Pro
    pub const GEMINI_1_5_PRO: &str = "gemini-1.5-pro";
    /// Gemini 2.0 Flash
    pub const GEMINI_2_0_FLASH: &str = "gemini-2.0-flash";
}
