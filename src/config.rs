use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub payment_gateway_secret: String,
    pub payment_gateway_webhook_secret: String,
    pub frontend_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            port: env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().expect("PORT must be a number"),
            payment_gateway_secret: env::var("PAYMENT_GATEWAY_SECRET")
                .expect("PAYMENT_GATEWAY_SECRET must be set"),
            payment_gateway_webhook_secret: env::var("PAYMENT_GATEWAY_WEBHOOK_SECRET")
                .expect("PAYMENT_GATEWAY_WEBHOOK_SECRET must be set"),
            frontend_url: env::var("FRONTEND_URL").expect("FRONTEND_URL must be set"),
        }
    }
}
