//! # toolrelay core
//!
//! Domain types, traits, and error definitions shared by every toolrelay crate.
//! Nothing here talks to the network or the disk; it defines the model the
//! other crates implement against.
//!
//! ## Layout
//!
//! - [`message`]: role-tagged turns, the canonical conversation form
//! - [`tool`]: tool declarations and structured tool calls
//! - [`provider`]: the upstream text-generation abstraction
//! - [`credential`]: bearer credentials and the store that rotates them

pub mod credential;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

pub use credential::{Credential, CredentialStore};
pub use error::{CredentialError, Error, ProviderError, Result};
pub use message::{Role, Turn};
pub use provider::{DriverRoute, Provider, ProviderRequest, ProviderResponse};
pub use tool::{ToolCall, ToolDeclaration};
