#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Session core for the Porchkit neighborhood app.
//!
//! The crate owns the one piece of the app with a real contract: the
//! [`session::SessionManager`], which tracks who is signed in, persists
//! credentials across restarts through the identity client, and exposes a
//! single reactive [`session::SessionState`] that every screen reads for
//! routing and personalization.
//!
//! Host platforms provide the capabilities at the edges: a
//! [`store::SecureStore`] backed by the device keychain/keystore and a
//! [`navigation::Navigator`] that moves the user between screens. The
//! hosted identity service is reached through the [`identity::IdentityClient`]
//! seam; [`identity::HttpIdentityClient`] is the production implementation.

mod config;
pub use config::*;

mod error;
pub use error::*;

mod user;
pub use user::*;

pub mod identity;
pub mod navigation;
pub mod session;
pub mod store;

// private modules
mod http_request;

/// Result alias used across the crate.
pub type PorchkitResult<T, E = PorchkitError> = std::result::Result<T, E>;
