use std::time::Duration;

pub const COOLDOWN_SECS: u32 = 15;
pub const COOLDOWN_TICK: Duration = Duration::from_secs(1);

/// Seconds left before another submission is accepted. Zero means inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cooldown {
    remaining: u32,
}

impl Cooldown {
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_active(&self) -> bool {
        self.remaining > 0
    }

    /// Returns `true` when the countdown was idle and needs a ticker.
    pub fn arm(&mut self, seconds: u32) -> bool {
        let was_idle = !self.is_active();
        self.remaining = seconds;
        was_idle && seconds > 0
    }

    /// One ticker beat. Returns the remaining seconds after the decrement.
    pub fn tick(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_zero_and_stays_there() {
        let mut cooldown = Cooldown::default();
        assert!(cooldown.arm(3));
        assert_eq!(cooldown.tick(), 2);
        assert_eq!(cooldown.tick(), 1);
        assert_eq!(cooldown.tick(), 0);
        assert!(!cooldown.is_active());
        assert_eq!(cooldown.tick(), 0);
    }

    #[test]
    fn rearming_a_running_countdown_needs_no_new_ticker() {
        let mut cooldown = Cooldown::default();
        assert!(cooldown.arm(COOLDOWN_SECS));
        cooldown.tick();
        assert!(!cooldown.arm(COOLDOWN_SECS));
        assert_eq!(cooldown.remaining(), COOLDOWN_SECS);
    }

    #[test]
    fn arming_with_zero_is_inert() {
        let mut cooldown = Cooldown::default();
        assert!(!cooldown.arm(0));
        assert!(!cooldown.is_active());
    }
}
