//! API server configuration

/// Environment-derived configuration for the API server.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Shared secret expected in the `x-admin-key` header on admin routes.
    pub admin_api_key: String,
    /// Stripe webhook signing secret; empty disables webhook ingress.
    pub stripe_webhook_secret: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let admin_api_key = std::env::var("ADMIN_API_KEY")
            .map_err(|_| anyhow::anyhow!("ADMIN_API_KEY must be set"))?;
        if admin_api_key.len() < 16 {
            anyhow::bail!("ADMIN_API_KEY must be at least 16 characters");
        }

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let stripe_webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();

        // Default to localhost for development; production sets ALLOWED_ORIGINS
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            bind_address,
            admin_api_key,
            stripe_webhook_secret,
            allowed_origins,
        })
    }
}
