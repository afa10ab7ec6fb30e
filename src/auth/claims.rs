use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Subscription;

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid, // user ID
    pub email: String,
    pub name: String,
    pub subscription: Subscription,
    pub is_admin: bool,
    pub is_paid: bool,
    pub iat: usize, // issued at (unix timestamp)
    pub exp: usize, // expires at (unix timestamp)
    pub iss: String,
    pub aud: String,
}
