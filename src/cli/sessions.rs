use anyhow::Result;

use crate::api::AppState;
use crate::core::AppConfig;

pub async fn list(config: AppConfig) -> Result<()> {
    let AppState { relay, .. } = AppState::from_config(config);
    for id in relay.sessions().await? {
        println!("{}", id);
    }
    Ok(())
}

pub async fn branch(session_id: &str, config: AppConfig) -> Result<()> {
    let AppState { relay, .. } = AppState::from_config(config);
    let new_session_id = relay.branch(session_id).await?;
    println!("{}", new_session_id);
    Ok(())
}
