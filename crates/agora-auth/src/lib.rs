//! Identity and credentials.
//!
//! The identity gate normalizes and validates registration input, hashes
//! passwords and resolves login identifiers. The credential store issues,
//! checks and revokes the single opaque session each user may hold.

pub mod identity;
pub mod password;
pub mod session;

pub use agora_db::{ForumError, Result};
pub use identity::IdentityGate;
pub use password::{Argon2Scheme, PasswordScheme};
pub use session::CredentialStore;
