//! Caller identity: credential extraction, session cookies and the resolver
//! that turns them into a settled [`AuthContext`].

pub mod credentials;
pub mod identity;
pub mod resolver;
pub mod session;

pub use credentials::{extract_credentials, Credential};
pub use identity::{AuthContext, AuthorityAuth, Identity, Session};
pub use resolver::{AuthResolver, Resolution};
pub use session::{request_origin, CookiePolicy, SessionStore};
