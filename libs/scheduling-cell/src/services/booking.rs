use async_trait::async_trait;
use reqwest::{header::{HeaderMap, HeaderValue}, Method};
use serde_json::Value;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{BookingConfirmation, BookingRequest};

const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";

/// Backend that turns a complete selection into an appointment.
#[async_trait]
pub trait BookingGateway: Send + Sync {
    async fn book_appointment(&self, request: BookingRequest) -> Result<BookingConfirmation, AppError>;
}

pub struct BookingService {
    supabase: SupabaseClient,
    auth_token: Option<String>,
}

impl BookingService {
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
impl BookingGateway for BookingService {
    async fn book_appointment(&self, request: BookingRequest) -> Result<BookingConfirmation, AppError> {
        debug!("Booking therapist {} for dependent {} on {}",
               request.therapist_id, request.dependent_id, request.date);

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            APPOINTMENTS_PATH,
            self.auth_token.as_deref(),
            Some(serde_json::to_value(&request)?),
            Some(headers),
        ).await?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("Failed to create appointment".to_string()))?;

        let confirmation: BookingConfirmation = serde_json::from_value(row)?;
        info!("Appointment {} created", confirmation.id);

        Ok(confirmation)
    }
}
