use crate::{
    api,
    auth::AuthConfig,
    cli::{actions::Action, telemetry},
};
use anyhow::{anyhow, Result};
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            secret_key,
            token_ttl_seconds,
            open_registration,
        } => {
            // Fail early on an unusable DSN instead of waiting for the pool
            let parsed = Url::parse(&dsn)?;
            if parsed.scheme() != "postgres" && parsed.scheme() != "postgresql" {
                return Err(anyhow!("Unsupported DSN scheme: {}", parsed.scheme()));
            }

            let config = AuthConfig::new(secret_key)
                .with_access_token_ttl_seconds(token_ttl_seconds)
                .with_open_registration(open_registration);

            api::new(port, dsn, config).await?;

            telemetry::shutdown_tracer();
        }
    }

    Ok(())
}
