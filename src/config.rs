/*!
Structs to hold configuration data and global state.

Configuration values are resolved in three layers: built-in defaults,
an optional TOML file, and finally environment variables (the form the
deployment actually uses). Detection of insecure leftovers is a pure
function over the resolved `Cfg`; whoever calls it decides whether to
log, abort, or ignore.
*/
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use time::Duration;

use crate::store::Store;

pub const DEFAULT_JWT_SECRET: &str = "default_secret_change_in_production";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Deserialize)]
struct ConfigFile {
    db_connect_string: Option<String>,
    jwt_secret: Option<String>,
    jwt_expire_days: Option<i64>,
    admin_uname: Option<String>,
    admin_password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    frontend_origin: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Cfg {
    pub db_connect_string: String,
    pub jwt_secret: String,
    pub token_lifetime: Duration,
    pub admin_uname: String,
    pub admin_password: String,
    pub addr: SocketAddr,
    pub frontend_origin: String,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_connect_string: "host=localhost user=campus_test password='campus_test' dbname=campus_test".to_owned(),
            jwt_secret: DEFAULT_JWT_SECRET.to_owned(),
            token_lifetime: Duration::days(7),
            admin_uname: "admin".to_owned(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_owned(),
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                5000
            ),
            frontend_origin: "http://localhost:5173".to_owned(),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_connect_string {
            c.db_connect_string = s;
        }
        if let Some(s) = cf.jwt_secret {
            c.jwt_secret = s;
        }
        if let Some(n) = cf.jwt_expire_days {
            c.token_lifetime = Duration::days(n);
        }
        if let Some(s) = cf.admin_uname {
            c.admin_uname = s;
        }
        if let Some(s) = cf.admin_password {
            c.admin_password = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.frontend_origin {
            c.frontend_origin = s;
        }

        Ok(c)
    }

    /// Overlay environment variables on whatever the file (or the
    /// defaults) provided.
    pub fn apply_env(&mut self) -> Result<(), String> {
        if let Ok(s) = std::env::var("CAMPUS_DB") {
            self.db_connect_string = s;
        }
        if let Ok(s) = std::env::var("JWT_SECRET") {
            self.jwt_secret = s;
        }
        if let Ok(s) = std::env::var("JWT_EXPIRE_DAYS") {
            let n: i64 = s.parse().map_err(|e| format!(
                "Error parsing JWT_EXPIRE_DAYS {:?}: {}", &s, &e
            ))?;
            self.token_lifetime = Duration::days(n);
        }
        if let Ok(s) = std::env::var("ADMIN_USERNAME") {
            self.admin_uname = s;
        }
        if let Ok(s) = std::env::var("ADMIN_PASSWORD") {
            self.admin_password = s;
        }
        if let Ok(s) = std::env::var("HOST") {
            self.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing HOST {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Ok(s) = std::env::var("PORT") {
            let n: u16 = s.parse().map_err(|e| format!(
                "Error parsing PORT {:?}: {}", &s, &e
            ))?;
            self.addr.set_port(n);
        }
        if let Ok(s) = std::env::var("FRONTEND_URL") {
            self.frontend_origin = s;
        }

        Ok(())
    }

    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let mut cfg = match path {
            Some(p) => Cfg::from_file(p)?,
            None => Cfg::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }
}

/// Examine a resolved configuration for values that should never reach
/// production. Detection only; the caller decides what to do about it.
pub fn startup_warnings(cfg: &Cfg) -> Vec<String> {
    let mut warnings: Vec<String> = Vec::new();

    if cfg.jwt_secret == DEFAULT_JWT_SECRET {
        warnings.push(
            "Using the default JWT secret. Set JWT_SECRET before deploying.".to_owned()
        );
    }
    if cfg.admin_password == DEFAULT_ADMIN_PASSWORD {
        warnings.push(
            "Using the default admin password. Set ADMIN_PASSWORD before deploying.".to_owned()
        );
    }
    if cfg.db_connect_string == Cfg::default().db_connect_string {
        warnings.push(
            "Using the default local database connection string. Set CAMPUS_DB before deploying.".to_owned()
        );
    }

    warnings
}

/// This guy hauls around the global state and is passed in an
/// `axum::Extension` to the handlers and middleware that need him.
/// Nothing in here is mutable after startup.
#[derive(Debug)]
pub struct Glob {
    pub cfg: Cfg,
    pub store: Store,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    #[test]
    fn default_config_warns_about_everything() {
        ensure_logging();

        let cfg = Cfg::default();
        let warnings = startup_warnings(&cfg);
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn hardened_config_is_quiet() {
        ensure_logging();

        let cfg = Cfg {
            db_connect_string: "host=db.internal user=campus dbname=campus".to_owned(),
            jwt_secret: "6fbf8a2d9c41".to_owned(),
            admin_password: "not-the-default".to_owned(),
            ..Cfg::default()
        };
        assert!(startup_warnings(&cfg).is_empty());
    }
}
