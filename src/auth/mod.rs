/// Authentication module
///
/// Password hashing, token issuing/decoding, and the service that ties
/// them to the credential and revocation stores.

mod claims;
mod jwt;
mod password;
mod service;

pub use claims::{Claims, TokenKind};
pub use jwt::{TokenIssuer, TokenPair};
pub use password::PasswordHasher;
pub use service::AuthService;
