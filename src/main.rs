use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use clap::Parser;
use jsonwebtoken::DecodingKey;
use std::{io, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod database;
mod error;
mod incident;
mod models;
mod routes;
mod services;
mod store;
#[cfg(test)]
mod testing;

use config::Args;
use incident::lifecycle::IncidentLifecycleManager;
use models::{actor::ActorAuthenticationMiddlewareFactory, photo::PHOTO_MAX_BYTES};
use services::{audit::TracingAuditLog, blob::LocalBlobStore, notification::LogNotifier};
use store::mongo::MongoIncidentStore;

fn startup_error(context: &str, error: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, error);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, error))
}

fn cors(origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(3600);

    if origins.is_empty() {
        return cors.allow_any_origin();
    }
    origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin.trim()))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("care_incident_server={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (client, db) = database::connect(&args.mongodb_uri, &args.mongodb_db)
        .await
        .map_err(|error| startup_error("database unavailable", error))?;

    let pem = std::fs::read(&args.jwt_public_key_path)
        .map_err(|error| startup_error("unable to read token public key", error))?;
    let key = DecodingKey::from_rsa_pem(&pem)
        .map_err(|error| startup_error("invalid token public key", error))?;

    let blobs = Arc::new(
        LocalBlobStore::new(
            args.blob_root.clone(),
            &args.blob_public_url,
            &args.blob_signing_secret,
        )
        .map_err(|error| startup_error("blob store unavailable", error))?,
    );
    let manager = web::Data::new(IncidentLifecycleManager::new(
        Arc::new(MongoIncidentStore::new(client, db)),
        blobs.clone(),
        Arc::new(TracingAuditLog),
        Arc::new(LogNotifier),
    ));
    let blobs = web::Data::from(blobs);

    info!("listening on {}:{}", args.host, args.port);
    let origins = args.cors_origins.clone();
    let (issuer, audience) = (args.jwt_issuer.clone(), args.jwt_audience.clone());
    HttpServer::new(move || {
        App::new()
            .wrap(ActorAuthenticationMiddlewareFactory::new(
                key.clone(),
                &issuer,
                &audience,
            ))
            .wrap(cors(&origins))
            .wrap(Logger::default())
            .app_data(manager.clone())
            .app_data(blobs.clone())
            .app_data(web::PayloadConfig::new(PHOTO_MAX_BYTES as usize))
            .configure(routes::configure)
    })
    .bind((args.host.as_str(), args.port))?
    .run()
    .await
}
