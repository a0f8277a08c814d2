pub mod breaker;
pub mod quota;
pub mod rate_limit;
pub mod shed;

pub use breaker::{CircuitBreaker, CircuitOpenError, CircuitState};
pub use quota::{QuotaManager, QuotaStatus};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use shed::{
    DegradationProfile, FixedMonitor, LoadLevel, LoadSample, LoadShedder, SysinfoMonitor,
    SystemMonitor,
};
