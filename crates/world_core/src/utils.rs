//! # Utility Functions
//!
//! Small helpers used across the world core.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in seconds.
///
/// A clock set before the epoch yields `0` rather than panicking.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Level-gap color shown next to a mob's name.
///
/// `0` gray, `1` green, `2` white, `3` yellow, `4` red.
pub fn level_color(observer_level: u16, mob_level: u16) -> u8 {
    let gap = mob_level as i32 - observer_level as i32;
    match gap {
        i32::MIN..=-10 => 0,
        -9..=-4 => 1,
        -3..=3 => 2,
        4..=9 => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_color_bands() {
        assert_eq!(level_color(50, 30), 0);
        assert_eq!(level_color(50, 45), 1);
        assert_eq!(level_color(50, 50), 2);
        assert_eq!(level_color(50, 56), 3);
        assert_eq!(level_color(50, 70), 4);
    }
}
