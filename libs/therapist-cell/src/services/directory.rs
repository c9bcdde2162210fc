use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::Therapist;

const THERAPISTS_PATH: &str =
    "/rest/v1/therapists?select=id,name,avatar_url,specialties&is_bookable=eq.true&order=name.asc";

/// Source of bookable therapists for the first wizard step.
#[async_trait]
pub trait TherapistDirectory: Send + Sync {
    async fn list_therapists(&self) -> Result<Vec<Therapist>, AppError>;
}

pub struct TherapistDirectoryService {
    supabase: SupabaseClient,
    auth_token: Option<String>,
}

impl TherapistDirectoryService {
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
impl TherapistDirectory for TherapistDirectoryService {
    async fn list_therapists(&self) -> Result<Vec<Therapist>, AppError> {
        debug!("Fetching bookable therapists");

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            THERAPISTS_PATH,
            self.auth_token.as_deref(),
            None,
        ).await?;

        let total = rows.len();
        let therapists: Vec<Therapist> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<Therapist>(row) {
                Ok(therapist) => Some(therapist),
                Err(e) => {
                    warn!("Skipping malformed therapist row: {}", e);
                    None
                }
            })
            .collect();

        info!("Loaded {} of {} therapist rows", therapists.len(), total);
        Ok(therapists)
    }
}
