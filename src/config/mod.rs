//! Configuration management.
//!
//! Two layers feed every adapter:
//!
//! - **Server defaults** ([`RuntimeConfig`]): process-wide, loaded once from
//!   TOML and/or standard environment variables, read-only afterwards.
//! - **Client credentials** ([`ClientCredentials`]): supplied per request by
//!   the end user; non-empty fields override the defaults for that call.
//!
//! # Configuration File Format
//!
//! The search order is:
//! 1. `./agent-runtime.toml` (project-local)
//! 2. `~/.config/agent-runtime/config.toml` (XDG config)
//!
//! ```toml
//! [providers.openai]
//! api_key_env = "OPENAI_API_KEY"
//! base_url_env = "OPENAI_PROXY_URL"
//!
//! [providers.azure]
//! api_key_env = "AZURE_API_KEY"
//! base_url = "https://my-resource.openai.azure.com"
//! api_version = "2024-02-01"
//!
//! [logging]
//! enabled = true
//! level = "info"
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use agent_runtime::config;
//!
//! // File config, with standard env variables for anything not listed
//! let config = config::load()?.with_env_fallbacks();
//! ```

mod file;
mod types;

pub use file::{from_path, from_str, load, search_paths, xdg_config_dir};
pub use types::{ClientCredentials, ProviderDefaults, RuntimeConfig};
