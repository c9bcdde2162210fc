use std::sync::Once;

use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::{AppConfig, SchedulingConfig};

static TRACING: Once = Once::new();

/// Installs a test subscriber once per process; honours `RUST_LOG`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub request_timeout_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            request_timeout_secs: 5,
        }
    }
}

impl TestConfig {
    /// Config aimed at a wiremock server.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            request_timeout_secs: self.request_timeout_secs,
            scheduling: SchedulingConfig::default(),
        }
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn therapist_response(id: Uuid, name: &str, specialties: &[&str]) -> Value {
        json!({
            "id": id,
            "name": name,
            "avatar_url": format!("https://cdn.example.com/avatars/{}.png", id),
            "specialties": specialties,
            "is_bookable": true
        })
    }

    pub fn time_slot_response(start: &str, end: &str) -> Value {
        json!({
            "start_time": start,
            "end_time": end
        })
    }

    pub fn dependent_response(id: Uuid, parent_id: Uuid, name: &str, age: u8) -> Value {
        json!({
            "id": id,
            "parent_id": parent_id,
            "name": name,
            "age": age,
            "avatar_url": null
        })
    }

    pub fn appointment_response(
        therapist_id: Uuid,
        dependent_id: Uuid,
        parent_id: Uuid,
        date: &str,
        start: &str,
        end: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "therapist_id": therapist_id,
            "dependent_id": dependent_id,
            "parent_id": parent_id,
            "date": date,
            "start_time": start,
            "end_time": end,
            "status": "scheduled",
            "created_at": "2024-06-01T09:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}
