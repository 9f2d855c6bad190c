use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sigconfirm_core::ports::ClockPort;
use sigconfirm_core::PortError;

/// Wall clock for session timestamps. Readings are strictly increasing, so
/// two sessions opened in the same millisecond, or across a backwards clock
/// step, still order by creation time.
#[derive(Debug, Default)]
pub struct SystemClockAdapter {
    last_ms: AtomicU64,
}

impl SystemClockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn wall_ms() -> Result<u64, PortError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PortError::Transport(format!("system clock before epoch: {e}")))?;
        u64::try_from(elapsed.as_millis())
            .map_err(|_| PortError::Transport("system clock out of range".to_string()))
    }

    fn next_after(&self, wall: u64) -> u64 {
        let mut last = self.last_ms.load(Ordering::Acquire);
        loop {
            let next = wall.max(last.saturating_add(1));
            match self
                .last_ms
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(observed) => last = observed,
            }
        }
    }
}

impl ClockPort for SystemClockAdapter {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.next_after(Self::wall_ms()?))
    }
}
