//! Command line and environment configuration.

use clap::Parser;
use std::path::PathBuf;

/// Incident reporting service for the care platform.
#[derive(Parser, Debug, Clone)]
#[command(name = "care-incident-server")]
#[command(about = "Incident reporting API: lifecycle, reference numbers and photo uploads")]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// MongoDB connection URI. Transactions need a replica set.
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    #[arg(long, env = "MONGODB_DB", default_value = "care")]
    pub mongodb_db: String,

    /// PEM file holding the RS256 public key of the platform's token issuer
    #[arg(long, env = "JWT_PUBLIC_KEY_PATH", default_value = "./keys/jwt_public.pem")]
    pub jwt_public_key_path: PathBuf,

    #[arg(long, env = "JWT_ISSUER", default_value = "care-platform")]
    pub jwt_issuer: String,

    #[arg(long, env = "JWT_AUDIENCE", default_value = "care-incident-server")]
    pub jwt_audience: String,

    /// Directory backing the blob store
    #[arg(long, env = "BLOB_ROOT", default_value = "./files/blobs")]
    pub blob_root: PathBuf,

    /// Base URL clients use to reach the blob routes
    #[arg(long, env = "BLOB_PUBLIC_URL", default_value = "http://127.0.0.1:8000")]
    pub blob_public_url: String,

    /// Secret signing upload and read credentials
    #[arg(long, env = "BLOB_SIGNING_SECRET")]
    pub blob_signing_secret: String,

    /// Comma separated origins allowed by CORS. Empty allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
