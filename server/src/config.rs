use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use argon2::Argon2;
use axum_extra::extract::cookie::Key;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Duration;
use platform_db::DatabaseSettings;

const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;
const COOKIE_KEY_SALT: &[u8] = b"bizdash-cookie-key";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub cookie_key: Key,
    pub cors_allowed_origins: Vec<String>,
    pub session_ttl: Duration,
    pub storage_dir: PathBuf,
    pub public_base_url: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let database = DatabaseSettings::from_env()?;

        let cookie_secret =
            std::env::var("COOKIE_SECRET_BASE64").context("COOKIE_SECRET_BASE64 missing")?;
        let cookie_key = decode_cookie_key(&cookie_secret)?;

        let cors_allowed_origins = parse_origins(
            &std::env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let session_ttl = match std::env::var("SESSION_TTL_HOURS") {
            Ok(raw) => {
                let hours = raw
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .filter(|h| *h > 0)
                    .ok_or_else(|| anyhow!("invalid SESSION_TTL_HOURS: {raw}"))?;
                Duration::hours(hours)
            }
            Err(_) => Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        };

        let storage_dir = std::env::var("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./storage"));
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            database,
            cookie_key,
            cors_allowed_origins,
            session_ttl,
            storage_dir,
            public_base_url,
        })
    }

    /// Base URL stored avatars are served from.
    pub fn storage_url(&self) -> String {
        format!("{}/storage", self.public_base_url)
    }
}

pub fn decode_cookie_key(encoded: &str) -> Result<Key> {
    let secret_bytes = STANDARD
        .decode(encoded.trim())
        .context("invalid COOKIE_SECRET_BASE64")?;
    if secret_bytes.len() < 32 {
        return Err(anyhow!(
            "COOKIE_SECRET_BASE64 must decode to at least 32 bytes"
        ));
    }
    if secret_bytes.len() >= 64 {
        return Ok(Key::from(&secret_bytes[..64]));
    }
    // Key wants 64 bytes of material; stretch shorter secrets with Argon2.
    let mut material = [0u8; 64];
    Argon2::default()
        .hash_password_into(&secret_bytes, COOKIE_KEY_SALT, &mut material)
        .map_err(|err| anyhow!("failed to derive cookie key: {err}"))?;
    Ok(Key::from(&material))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
