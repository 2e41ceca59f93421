use crate::api;
use crate::auth::{
    reset::ResetConfig, service::AuthConfig, session::SessionConfig,
};
use crate::cli::actions::Action;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            frontend_url,
            reset_ttl,
            session_ttl,
        } => {
            let auth_config = AuthConfig::new()
                .with_frontend_base_url(frontend_url)
                .with_reset(ResetConfig::new().with_ttl_seconds(reset_ttl))
                .with_session(SessionConfig::new().with_ttl_seconds(session_ttl));

            api::new(port, dsn, auth_config).await?;
        }
    }

    Ok(())
}
