use crate::cli::actions::Action;
use crate::session::SessionConfig;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            store_url,
            secret_key,
            access_ttl,
            refresh_ttl,
        } => {
            let config = SessionConfig::new(secret_key)
                .with_access_ttl_seconds(access_ttl)
                .with_refresh_ttl_seconds(refresh_ttl);

            crate::authd::new(port, dsn, store_url, config).await?;
        }
    }

    Ok(())
}
