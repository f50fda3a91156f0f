//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

// =============================================================================
// Bot Defaults
// =============================================================================

pub fn default_api_url() -> String {
    "https://platform-api.max.ru".to_string()
}

pub fn default_poll_timeout() -> u64 {
    30
}

pub fn default_http_timeout() -> u64 {
    10
}

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_db_path() -> String {
    "wavecall.db".to_string()
}

// =============================================================================
// Dispatch Defaults
// =============================================================================

pub fn default_wave_size() -> usize {
    15
}

pub fn default_wave_interval() -> u64 {
    15
}

pub fn default_timer_interval() -> u64 {
    5
}

pub fn default_max_waves() -> i64 {
    5
}

pub fn default_debounce() -> u64 {
    2
}

pub fn default_conversation_ttl() -> u64 {
    1800
}

// =============================================================================
// Rooms Defaults
// =============================================================================

pub fn default_reconcile_interval() -> u64 {
    300
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_metrics_port() -> u16 {
    9090
}
