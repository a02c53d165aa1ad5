//! Public types for the branch API
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct BranchResponse {
    pub new_session_id: String,
}
