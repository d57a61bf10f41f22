//! User-facing texts for the counter page

/// Upper and lower counter bounds
pub mod bounds {
    pub const MAX_COUNT: i64 = 10;
    pub const MIN_COUNT: i64 = 0;
}

/// Error toasts for unexpected failures
pub mod errors {
    pub const COUNTER_INCREMENT: &str = "Something went wrong while incrementing the counter.";
    pub const COUNTER_DECREMENT: &str = "Something went wrong while decrementing the counter.";
    pub const COUNTER_RESET: &str = "Something went wrong while resetting the counter.";
    pub const DARK_MODE_TOGGLE: &str = "Could not switch the color theme.";
}

pub mod success {
    pub const COUNTER_RESET: &str = "The counter has been reset.";
    pub const DARK_MODE_ON: &str = "Switched to dark mode.";
    pub const DARK_MODE_OFF: &str = "Switched to light mode.";
}

/// Business-rule warnings
pub mod warnings {
    pub const COUNTER_MAX: &str = "The counter reached its maximum (10).";
    pub const COUNTER_MIN: &str = "The counter reached its minimum (0).";
}
