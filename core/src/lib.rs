//! Authenticated, retrying access to the image search backend.
//!
//! Control flows from [`client::ImageService`] (or any caller of
//! [`executor::CallExecutor::execute`]) down to an
//! [`client::ImageSearchTransport`]; every attempt carries a fresh
//! [`metadata::CallMetadata`] snapshot taken from the [`auth::AuthManager`].

pub mod auth;
pub mod client;
pub mod config;
pub mod executor;
pub mod metadata;

pub use auth::AccessToken;
pub use auth::AuthError;
pub use auth::AuthManager;
pub use auth::CredentialProvider;
pub use auth::HttpCredentialProvider;
pub use client::HttpImageSearchClient;
pub use client::ImageSearchTransport;
pub use client::ImageService;
pub use client::SEARCH_IMAGES_DESCRIPTION;
pub use config::ClientConfig;
pub use config::ConfigError;
pub use config::LateResponsePolicy;
pub use config::SearchSettings;
pub use executor::CallExecutor;
pub use executor::DismissedPrompt;
pub use executor::Notifier;
pub use executor::PromptChoice;
pub use executor::RetryPrompt;
pub use executor::TracingNotifier;
pub use executor::UserPrompt;
pub use metadata::CallMetadata;
