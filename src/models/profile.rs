use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Driver,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
}

impl Profile {
    pub fn new(full_name: impl Into<String>, phone: Option<&str>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            phone: phone.map(str::to_string),
            role,
        }
    }
}
