pub mod auth;
pub mod config;
pub mod err;
pub mod mail;
pub mod models;
pub mod registration;
pub mod scheduler;
pub mod sessions;
pub mod store;
pub mod tasks;

use axum::handler::Handler;
use axum::{routing::get, routing::post, Extension, Router};

use std::sync::Arc;

use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::broadcast;

use crate::config::{Config, Storage};
use crate::err::{Fine, Maybe, Nothing};
use crate::mail::{HttpMailer, LogNotifier, Notifier};
use crate::registration::Registrar;
use crate::scheduler::DeadlineScheduler;
use crate::store::{CredentialStore, MemoryStore, PgStore};

pub use crate::err::Error;

pub type Payload<T> = axum::response::Result<Maybe<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V> where V: Serialize {
    Ok(Fine(value))
}

pub fn breaks<V>(err: Error) -> Payload<V> where V: Serialize {
    log::debug!("Request rejected: {:?}", err);
    Ok(Nothing(err))
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub registrar: Arc<Registrar>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", get(tasks::list_tasks))
        .route("/task", get(tasks::get_task))
        .route("/createTask", get(tasks::create_task))
        .route("/updateTask", post(tasks::update_task))
        .route("/deleteTask", get(tasks::delete_task))
        .route("/register", get(auth::register))
        .route("/regFinish", get(auth::finish_registration))
        .route("/login", get(auth::login))
        .route("/delUser", get(auth::delete_user))
        .route("/changePassword", get(auth::change_password))
        .fallback(err::handler404.into_service())
        .layer(Extension(state))
}

async fn open_store(storage: &Storage) -> anyhow::Result<Arc<dyn CredentialStore>> {
    match storage {
        Storage::Postgres { url, max_connections } => {
            let pg = PgPoolOptions::new()
                .max_connections(*max_connections)
                .connect(url)
                .await?;
            let store = PgStore::new(pg);
            store.migrate().await?;
            log::info!("Connected to Postgres");
            Ok(Arc::new(store))
        }
        Storage::Memory => {
            log::warn!("Using in-memory storage, users will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                log::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C, shutting down"),
        _ = terminate => log::info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::from_env()?;

    let store = open_store(&config.storage).await?;
    let notifier: Arc<dyn Notifier> = match config.mail.clone() {
        Some(mail) => Arc::new(HttpMailer::new(
            mail.api_url,
            mail.api_key,
            mail.sender,
            mail.sender_name,
            mail.timeout,
        )?),
        None => {
            log::warn!("MAIL_API_KEY is not set, outgoing mail will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let registrar = Registrar::new(
        store.clone(),
        notifier.clone(),
        chrono::Duration::from_std(config.activation_ttl)?,
    );
    let scheduler = DeadlineScheduler::new(
        store.clone(),
        notifier,
        config.reminder_interval,
        chrono::Duration::from_std(config.reminder_window)?,
    );

    let (stop, stopped) = broadcast::channel(1);
    let reminders = scheduler.spawn(stopped);

    let app = router(AppState {
        store,
        registrar: Arc::new(registrar),
    });

    log::info!("Starting Tasker HTTP Server on http://{}", config.bind);
    axum::Server::bind(&config.bind)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop.send(());
    reminders.await?;
    Ok(())
}
