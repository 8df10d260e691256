pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService};
pub use auth_service_impl::SeaOrmAuthService;

pub mod registration_service;
pub mod registration_service_impl;
pub use registration_service::{RegistrationError, RegistrationService};
pub use registration_service_impl::SeaOrmRegistrationService;

pub mod rate_limit;
pub use rate_limit::{Decision, EndpointClass, RateLimiter};

pub mod session;
pub use session::{SessionClaims, SessionExpiry, SessionIssuer};
