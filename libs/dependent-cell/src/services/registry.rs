use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::Dependent;

#[async_trait]
pub trait DependentRegistry: Send + Sync {
    async fn list_dependents(&self, parent_id: Uuid) -> Result<Vec<Dependent>, AppError>;
}

pub struct DependentService {
    supabase: SupabaseClient,
    auth_token: Option<String>,
}

impl DependentService {
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
impl DependentRegistry for DependentService {
    async fn list_dependents(&self, parent_id: Uuid) -> Result<Vec<Dependent>, AppError> {
        debug!("Fetching dependents for parent: {}", parent_id);

        let path = format!(
            "/rest/v1/dependents?select=id,name,age,avatar_url&parent_id=eq.{}&order=name.asc",
            parent_id
        );
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            self.auth_token.as_deref(),
            None,
        ).await?;

        let dependents = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<Dependent>(row) {
                Ok(dependent) => Some(dependent),
                Err(e) => {
                    warn!("Skipping malformed dependent row: {}", e);
                    None
                }
            })
            .collect();

        Ok(dependents)
    }
}
