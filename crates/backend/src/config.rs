use std::path::PathBuf;
use std::str::FromStr;

use georoute_shared::geo::Geofence;
use georoute_shared::ledger::OverlayPolicy;
use georoute_shared::mode::{ClickGate, DEFAULT_MIN_ZOOM};
use georoute_shared::models::GeoBounds;
use georoute_shared::session::SessionSettings;

/// Server settings, read from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub route_service_url: String,
    /// `None` when `MIN_ZOOM=0`.
    pub min_zoom: Option<u8>,
    pub geofence: Geofence,
    pub overlay_policy: OverlayPolicy,
    pub backlog_max_entries: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 3000,
            db_path: PathBuf::from("data/georoute.redb"),
            route_service_url: "http://localhost:8000".to_string(),
            min_zoom: Some(DEFAULT_MIN_ZOOM),
            geofence: Geofence::gulf_region(),
            overlay_policy: OverlayPolicy::Accumulate,
            backlog_max_entries: 100,
        }
    }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("Invalid {}={:?}: {}", name, raw, e))
}

/// Parse `south,west,north,east`.
fn parse_bounds(raw: &str) -> Result<GeoBounds, String> {
    let parts = raw
        .split(',')
        .map(|p| parse::<f64>("GEOFENCE", p))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [south, west, north, east] if south < north && west < east => {
            Ok(GeoBounds::new(*south, *west, *north, *east))
        }
        _ => Err(format!(
            "Invalid GEOFENCE={:?}: expected south,west,north,east with south < north and west < east",
            raw
        )),
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = ServerConfig::default();
        if let Some(v) = lookup("PORT") {
            config.port = parse("PORT", &v)?;
        }
        if let Some(v) = lookup("DB_PATH") {
            config.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROUTE_SERVICE_URL") {
            config.route_service_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("MIN_ZOOM") {
            let zoom: u8 = parse("MIN_ZOOM", &v)?;
            config.min_zoom = (zoom > 0).then_some(zoom);
        }
        if let Some(v) = lookup("GEOFENCE") {
            config.geofence.bounds = parse_bounds(&v)?;
        }
        if let Some(v) = lookup("GEOFENCE_NAME") {
            config.geofence.name = v;
        }
        if let Some(v) = lookup("OVERLAY_POLICY") {
            config.overlay_policy = parse("OVERLAY_POLICY", &v)?;
        }
        if let Some(v) = lookup("BACKLOG_MAX_ENTRIES") {
            config.backlog_max_entries = parse("BACKLOG_MAX_ENTRIES", &v)?;
            if config.backlog_max_entries == 0 {
                return Err("BACKLOG_MAX_ENTRIES must be at least 1".to_string());
            }
        }
        Ok(config)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            gate: ClickGate {
                min_zoom: self.min_zoom,
                geofence: self.geofence.clone(),
            },
            overlay_policy: self.overlay_policy,
        }
    }
}
