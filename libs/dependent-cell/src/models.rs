use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A child profile owned by the profile subsystem. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependent {
    pub id: Uuid,
    pub name: String,
    pub age: u8,
    pub avatar_url: Option<String>,
}

impl Dependent {
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|part| part.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }
}
