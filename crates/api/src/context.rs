//! The authenticated caller, attached to a request by [`crate::middleware`].

pub use eln_auth::Principal as RequestPrincipal;
