use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::routes::{NotFoundPolicy, Service};

pub const GATEWAY_ENV: &str = "EXAM_PORTAL_GATEWAY";
pub const HUB_ENV: &str = "EXAM_PORTAL_HUB";

/// Direct per-service base URLs, used when the gateway cannot serve a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceBases {
    pub auth: String,
    pub exams: String,
    pub courses: String,
    pub materials: String,
    pub chat: String,
}

impl Default for ServiceBases {
    fn default() -> Self {
        Self {
            auth: "http://localhost:5001/api".into(),
            exams: "http://localhost:5002/api".into(),
            courses: "http://localhost:5003/api".into(),
            materials: "http://localhost:5004/api".into(),
            chat: "http://localhost:5005/api".into(),
        }
    }
}

impl ServiceBases {
    pub fn base_for(&self, service: Service) -> Option<&str> {
        let base = match service {
            Service::Auth => &self.auth,
            Service::Exams => &self.exams,
            Service::Courses => &self.courses,
            Service::Materials => &self.materials,
            Service::Chat => &self.chat,
        };
        if base.trim().is_empty() { None } else { Some(base.as_str()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Newest messages kept per room; older ones are evicted on write.
    pub max_messages_per_room: usize,
    /// Cached messages older than this are ignored and purged.
    pub max_age_days: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { max_messages_per_room: 200, max_age_days: 7 }
    }
}

impl CacheSettings {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_age_days) * 24 * 60 * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gateway_base: String,
    pub services: ServiceBases,
    pub hub_url: String,
    pub request_timeout_secs: u64,
    pub retry_not_found: NotFoundPolicy,
    /// Origin of the web front end; payment return/cancel URLs are built from it.
    pub site_origin: String,
    pub cache: CacheSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_base: "http://localhost:5000/api".into(),
            services: ServiceBases::default(),
            hub_url: "ws://localhost:5005/hubs/chat".into(),
            request_timeout_secs: 15,
            retry_not_found: NotFoundPolicy::default(),
            site_origin: "http://localhost:5173".into(),
            cache: CacheSettings::default(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    // TOML is the primary format; a legacy JSON settings file is read once and rewritten as TOML.
    pub fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("exam-portal.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        let proj = directories::ProjectDirs::from("vn", "examportal", "ExamPortal")?;
        Some(proj.config_dir().join("settings.json"))
    }

    /// Loads settings from `path` when given, otherwise from the default locations,
    /// then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Self {
        let settings = match path {
            Some(p) => Self::read_toml(p).unwrap_or_else(|| {
                log::info!("Settings file {} not readable; using defaults", p.display());
                Self::default()
            }),
            None => Self::load_default_locations(),
        };
        settings.with_env_overrides()
    }

    fn load_default_locations() -> Self {
        if let Some(path) = Self::toml_path() {
            if let Some(state) = Self::read_toml(&path) {
                return state;
            }
        }

        if let Some(legacy) = Self::legacy_json_path() {
            if let Ok(bytes) = fs::read(&legacy) {
                match serde_json::from_slice::<Settings>(&bytes) {
                    Ok(settings) => {
                        if let Err(e) = settings.save(None) {
                            log::warn!("Could not migrate legacy settings: {e}");
                        }
                        return settings;
                    }
                    Err(e) => log::warn!("Ignoring malformed {}: {e}", legacy.display()),
                }
            }
        }

        Self::default()
    }

    fn read_toml(path: &Path) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        match toml::from_str::<Settings>(&text) {
            Ok(settings) => Some(settings),
            Err(e) => {
                log::warn!("Failed to parse settings file {}: {e}", path.display());
                None
            }
        }
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(
            std::env::var(GATEWAY_ENV).ok(),
            std::env::var(HUB_ENV).ok(),
        );
        self
    }

    fn apply_overrides(&mut self, gateway: Option<String>, hub: Option<String>) {
        if let Some(g) = gateway.filter(|g| !g.trim().is_empty()) {
            self.gateway_base = crate::utils::normalize_url(&g);
        }
        if let Some(h) = hub.filter(|h| !h.trim().is_empty()) {
            self.hub_url = h.trim().to_string();
        }
    }

    pub fn save(&self, path: Option<&Path>) -> std::io::Result<()> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::toml_path()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "No config dir"))?,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        fs::write(path, toml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let text = r#"
            gateway_base = "https://gw.example.vn/api"
            [services]
            chat = "https://chat.example.vn/api"
        "#;
        let s: Settings = toml::from_str(text).unwrap();
        assert_eq!(s.gateway_base, "https://gw.example.vn/api");
        assert_eq!(s.services.chat, "https://chat.example.vn/api");
        assert_eq!(s.services.exams, ServiceBases::default().exams);
        assert_eq!(s.request_timeout_secs, 15);
        assert_eq!(s.cache.max_messages_per_room, 200);
    }

    #[test]
    fn save_then_load_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("exam-portal.toml");
        let mut s = Settings::default();
        s.site_origin = "https://hoc.example.vn".into();
        s.save(Some(&path)).unwrap();
        let loaded = Settings::read_toml(&path).unwrap();
        assert_eq!(loaded.site_origin, "https://hoc.example.vn");
    }

    #[test]
    fn overrides_normalize_gateway() {
        let mut s = Settings::default();
        s.apply_overrides(Some("gw.example.vn/api/".into()), Some(" ".into()));
        assert_eq!(s.gateway_base, "https://gw.example.vn/api");
        assert_eq!(s.hub_url, Settings::default().hub_url);
    }

    #[test]
    fn empty_service_base_disables_fallback() {
        let mut bases = ServiceBases::default();
        bases.materials = String::new();
        assert!(bases.base_for(Service::Materials).is_none());
        assert!(bases.base_for(Service::Chat).is_some());
    }
}
