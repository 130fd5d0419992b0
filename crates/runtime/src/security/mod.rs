//! Outbound-request defenses: SSRF guard and per-key rate limiting.

pub mod rate_limiter;
pub mod ssrf;

pub use rate_limiter::RateLimiter;
pub use ssrf::SsrfGuard;
