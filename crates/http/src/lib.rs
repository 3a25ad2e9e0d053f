//! Portal HTTP client with session management and response caching
//!
//! [`PortalClient`] sends every request through an explicit middleware chain
//! (cache lookup, retry on 401, credential attachment). Credentials and cached
//! responses live in a [`portal_core::KeyValueStore`], so they persist when a
//! persistent store is plugged in.

pub mod cache;
pub mod client;
pub mod middleware;
pub mod session;
pub mod types;

pub use cache::{Lookup, ResponseCache};
pub use client::{ApiRequest, ApiResponse, ClientError, PortalClient, PortalClientBuilder};
pub use middleware::{Chain, Next, Stage};
pub use session::{SessionEvent, SessionManager, TokenRefresher};
pub use types::{LoginRequest, RegisterRequest, TokenResponse};
