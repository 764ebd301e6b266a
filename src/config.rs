use std::time::Duration;

/// Process-wide settings, assembled once and threaded by value (or cheap
/// clone) into every stage constructor, mirroring how the sync daemon this
/// crate grew out of threaded a single `SyncConfig` into its workers instead
/// of reaching for globals.
#[derive(Debug, Clone)]
pub struct Config {
    pub timezone: chrono_tz::Tz,
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    pub min_gap_minutes_complex: i64,
    pub min_gap_minutes_simple: i64,
    pub max_tasks_per_day: Option<usize>,
    pub default_simple_duration_minutes: i64,
    pub llm_model: String,
    pub llm_bridge_base_url: String,
    pub calendar_bridge_base_url: String,
    pub db_path: String,
    pub bridge_write_timeout: Duration,
    pub bridge_fetch_timeout: Duration,
    pub llm_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            work_start_hour: 6,
            work_end_hour: 23,
            min_gap_minutes_complex: 5,
            min_gap_minutes_simple: 0,
            max_tasks_per_day: None,
            default_simple_duration_minutes: 30,
            llm_model: "llama3".to_string(),
            llm_bridge_base_url: "http://localhost:11434".to_string(),
            calendar_bridge_base_url: "http://localhost:8787".to_string(),
            db_path: "calbridge.db".to_string(),
            bridge_write_timeout: Duration::from_secs(10),
            bridge_fetch_timeout: Duration::from_secs(20),
            llm_timeout: Duration::from_secs(120),
        }
    }
}

impl Config {
    /// Layer environment variables (`CALBRIDGE_*`) over the compiled-in
    /// defaults. Unset or unparseable variables are left at their default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(tz) = std::env::var("CALBRIDGE_TIMEZONE") {
            if let Ok(parsed) = tz.parse() {
                cfg.timezone = parsed;
            }
        }
        if let Some(h) = env_u32("CALBRIDGE_WORK_START_HOUR") {
            cfg.work_start_hour = h;
        }
        if let Some(h) = env_u32("CALBRIDGE_WORK_END_HOUR") {
            cfg.work_end_hour = h;
        }
        if let Some(m) = env_i64("CALBRIDGE_MIN_GAP_MINUTES") {
            cfg.min_gap_minutes_complex = m;
        }
        if let Some(n) = std::env::var("CALBRIDGE_MAX_TASKS_PER_DAY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            cfg.max_tasks_per_day = Some(n);
        }
        if let Ok(model) = std::env::var("CALBRIDGE_LLM_MODEL") {
            cfg.llm_model = model;
        }
        if let Ok(url) = std::env::var("CALBRIDGE_LLM_BRIDGE_URL") {
            cfg.llm_bridge_base_url = url;
        }
        if let Ok(url) = std::env::var("CALBRIDGE_CALENDAR_BRIDGE_URL") {
            cfg.calendar_bridge_base_url = url;
        }
        if let Ok(path) = std::env::var("CALBRIDGE_DB_PATH") {
            cfg.db_path = path;
        }

        cfg
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
