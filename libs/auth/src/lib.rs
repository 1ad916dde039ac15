//! Single-use auth tickets for E2E subprocess logins.
//!
//! The host test process issues a ticket bound to a user, hands it to the
//! external runner through its parameter payload, and the runner redeems it
//! exactly once against the auth endpoint served by `e2e-auth-gateway`.
//! [`InMemoryAuthTicketStore`] serves a gateway embedded in the test
//! process; [`FileAuthTicketStore`] lets a separate gateway process see the
//! tickets the host issues.

mod file_store;
mod issuer;
mod store;
mod ticket;
mod user;

pub use file_store::{FileAuthTicketStore, TICKET_DIR_ENV};
pub use issuer::{
    AuthConfig, AuthTicketError, AuthTicketIssuer, DEFAULT_GUARD, DEFAULT_TTL_SECONDS,
    NullAuthTicketIssuer, SharedAuthTicketIssuer, StoreAuthTicketIssuer,
};
pub use store::{AuthTicketStore, InMemoryAuthTicketStore, SharedAuthTicketStore};
pub use ticket::{AuthMode, AuthTicket, ParseAuthModeError};
pub use user::{Authenticatable, TokenIssuer, UserId};
