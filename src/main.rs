#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod db;
mod env;
mod error;
mod models;
mod search;
mod stats;
mod storage;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;
mod verification;

use std::sync::Mutex;

use api::achievements::documents;
use api::session::{dashboard, dashboard_anonymous};
use auth::{forbidden_api, unauthorized, unauthorized_api};
use config::AppConfig;
use db::clean_expired_sessions;
use env::load_environment;
use error::AppError;
use once_cell::sync::Lazy;
use rocket::fairing::AdHoc;
use rocket::figment::Figment;
use rocket::{Build, Rocket, tokio};
use sqlx::SqlitePool;
use storage::{LocalObjectStore, ObjectStore};
use telemetry::{OtelGuard, TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;
use tracing::info;

pub static TELEMETRY_GUARD: Lazy<Mutex<Option<OtelGuard>>> = Lazy::new(|| Mutex::new(None));

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Env(#[from] dotenvy::Error),
    #[error("{0}")]
    Figment(Box<rocket::figment::Error>),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(Box::new(value))
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    load_environment()?;

    let guard = init_tracing();
    if let Ok(mut slot) = TELEMETRY_GUARD.lock() {
        *slot = guard;
    }

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://achievements.db?mode=rwc".to_string());

    let pool = SqlitePool::connect(&database_url).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed successfully");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    let figment = config::figment();
    let app_config = AppConfig::from_figment(&figment)?;
    let store = LocalObjectStore::new(
        app_config.document_dir.clone(),
        &app_config.document_url_prefix,
    );

    let _rocket = init_rocket(pool, figment, app_config, Box::new(store))
        .launch()
        .await?;

    Ok(())
}

pub fn init_rocket(
    pool: SqlitePool,
    figment: Figment,
    app_config: AppConfig,
    store: Box<dyn ObjectStore>,
) -> Rocket<Build> {
    info!("Starting achievement tracker");

    rocket::custom(figment)
        .manage(pool)
        .manage(app_config)
        .manage(store)
        .mount("/api", api::routes())
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .mount("/", routes![dashboard, dashboard_anonymous, documents])
        .register("/", catchers![unauthorized, forbidden_api])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async move { shutdown_telemetry() })
        }))
}
