//! Injected clock.
//!
//! Workflow timestamps are metadata only; canonical hashes never include
//! them. The system clock is the default, a fixed clock keeps tests
//! bit-stable.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub trait Clock: Send + Sync {
    fn now_iso8601(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_iso8601(&self) -> String {
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn now_iso8601(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_fixed() {
        let c = FixedClock("2026-01-01T00:00:00Z".to_string());
        assert_eq!(c.now_iso8601(), c.now_iso8601());
    }

    #[test]
    fn system_clock_is_rfc3339_shaped() {
        let now = SystemClock.now_iso8601();
        assert!(now.contains('T'));
        assert!(now.len() >= 20);
    }
}
