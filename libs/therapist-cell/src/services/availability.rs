use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{AvailabilityQuery, TimeSlot};

const AVAILABILITY_RPC_PATH: &str = "/rest/v1/rpc/get_therapist_availability";

/// Open time windows for one therapist on one calendar date.
#[async_trait]
pub trait AvailabilityProvider: Send + Sync {
    async fn get_availability(&self, therapist_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, AppError>;
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
    auth_token: Option<String>,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.auth_token = Some(auth_token.into());
        self
    }
}

#[async_trait]
impl AvailabilityProvider for AvailabilityService {
    async fn get_availability(&self, therapist_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, AppError> {
        debug!("Fetching availability for therapist {} on {}", therapist_id, date);

        let query = AvailabilityQuery {
            p_therapist_id: therapist_id,
            p_date: date,
        };

        let rows: Vec<Value> = self.supabase.request(
            Method::POST,
            AVAILABILITY_RPC_PATH,
            self.auth_token.as_deref(),
            Some(serde_json::to_value(&query)?),
        ).await?;

        Ok(normalize_slots(rows))
    }
}

/// Drops malformed rows and duplicates, and sorts by start time.
fn normalize_slots(rows: Vec<Value>) -> Vec<TimeSlot> {
    let mut slots: Vec<TimeSlot> = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<TimeSlot>(row) {
            Ok(slot) => Some(slot),
            Err(e) => {
                warn!("Skipping malformed availability row: {}", e);
                None
            }
        })
        .collect();

    slots.sort();
    slots.dedup();
    slots
}
