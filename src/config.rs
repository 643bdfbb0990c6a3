use std::env;

use time::OffsetDateTime;

pub struct Config {
    pub database_url: String,
    /// Base URL of the provider messaging API, e.g. `https://graph.example.com/v19.0`.
    pub api_base_url: String,
    /// Offset from UTC applied when evaluating active-hours windows.
    pub utc_offset_hours: i8,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let api_base_url = env::var("MESSAGING_API_BASE_URL")
            .unwrap_or_else(|_| "https://graph.facebook.com/v19.0".to_string());

        let utc_offset_hours = env::var("ACCOUNT_UTC_OFFSET_HOURS")
            .ok()
            .and_then(|v| v.parse::<i8>().ok())
            .unwrap_or(0);

        Config {
            database_url,
            api_base_url,
            utc_offset_hours,
        }
    }

    /// The account-local hour of day for `now`, in `0..24`.
    pub fn local_hour(&self, now: OffsetDateTime) -> u32 {
        let shifted = now + time::Duration::hours(self.utc_offset_hours as i64);
        shifted.hour() as u32
    }
}
