//! AuthZ Gate: tokens, principals, and the role+ownership checks consumed
//! by every write and read path in the core.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod principal;

pub use authorize::{authorize, Action, AuthzError};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError};
pub use password::{PasswordError, PasswordHasher};
pub use principal::Principal;
