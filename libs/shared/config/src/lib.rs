use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Slot length used when a caller does not request one explicitly.
    pub default_slot_duration_minutes: i32,
    /// Sessions idle for longer than this are expired on next access.
    pub session_timeout_hours: i64,
    /// Upper bound on a serialized session context, in bytes.
    pub max_session_context_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            default_slot_duration_minutes: env::var("DEFAULT_SLOT_DURATION_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            session_timeout_hours: env::var("SESSION_TIMEOUT_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            max_session_context_bytes: env::var("MAX_SESSION_CONTEXT_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4096),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}
