use std::collections::HashMap;
use std::fmt;
use std::fs;

/// INI-style configuration: `key = value` pairs, optionally under
/// `[section]` headers. Lines starting with `#` are comments.
#[derive(Debug)]
pub struct Config {
    pub globals: HashMap<String, String>,
    pub sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Error reading file {path}: {e}"))?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut globals = HashMap::new();
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = &line[1..line.len() - 1];
                current_section = Some(name.to_string());
                continue;
            }

            if let Some(pos) = line.find('=') {
                let key = line[..pos].trim().to_string();
                let value = line[pos + 1..].trim().trim_matches('"').to_string();

                match &current_section {
                    None => {
                        globals.insert(key, value);
                    }
                    Some(sec) => {
                        sections.entry(sec.clone()).or_default().insert(key, value);
                    }
                }
            }
        }
        Config { globals, sections }
    }

    pub fn empty() -> Self {
        Self {
            globals: HashMap::new(),
            sections: HashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_or_default<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.get(section, key)
            .or_else(|| self.get_global(key))
            .unwrap_or(default)
    }
}

/// Startup refusal: the publisher will not come up on a broken config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingPorts,
    BadValue { key: &'static str, value: String },
    MissingTlsMaterial,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPorts => {
                write!(f, "neither a plain nor a TLS signalling port is configured")
            }
            Self::BadValue { key, value } => write!(f, "invalid value for {key}: {value}"),
            Self::MissingTlsMaterial => {
                write!(f, "TLS port configured but certificate or key path missing")
            }
        }
    }
}
impl std::error::Error for ConfigError {}

/// Typed view over the `[Publisher]`, `[Ice]`, `[TLS]`, `[Policy]` and
/// `[Segment]` sections.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub server_name: String,
    pub bind_ip: String,
    /// Plain signalling port; 0 disables the plain listener.
    pub signalling_port: u16,
    /// TLS signalling port; 0 disables the TLS listener.
    pub signalling_tls_port: u16,
    pub worker_count: usize,
    pub media_port: u16,
    pub ice_candidate_ips: Vec<String>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub dtls_cert_path: String,
    pub dtls_key_path: String,
    pub policy_secret: Option<String>,
    pub token_secret: Option<String>,
    pub segment_count: usize,
    pub segment_duration_ms: u64,
}

impl PublisherConfig {
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let signalling_port = parse_u16(cfg, "Publisher", "signalling_port", 3333)?;
        let signalling_tls_port = parse_u16(cfg, "Publisher", "signalling_tls_port", 0)?;
        if signalling_port == 0 && signalling_tls_port == 0 {
            return Err(ConfigError::MissingPorts);
        }

        let tls_cert_path = cfg.get_non_empty("TLS", "cert").map(str::to_string);
        let tls_key_path = cfg.get_non_empty("TLS", "key").map(str::to_string);
        if signalling_tls_port != 0 && (tls_cert_path.is_none() || tls_key_path.is_none()) {
            return Err(ConfigError::MissingTlsMaterial);
        }

        let ice_candidate_ips = cfg
            .get_non_empty("Ice", "candidates")
            .map(|s| s.split(',').map(|c| c.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Self {
            server_name: cfg.get_or_default("Publisher", "name", "streamedge").into(),
            bind_ip: cfg.get_or_default("Publisher", "ip", "0.0.0.0").into(),
            signalling_port,
            signalling_tls_port,
            worker_count: parse_u16(cfg, "Publisher", "worker_count", 4)? as usize,
            media_port: parse_u16(cfg, "Ice", "media_port", 10000)?,
            ice_candidate_ips,
            tls_cert_path,
            tls_key_path,
            dtls_cert_path: cfg
                .get_or_default("TLS", "dtls_cert", "certs/dtls/cert.pem")
                .into(),
            dtls_key_path: cfg
                .get_or_default("TLS", "dtls_key", "certs/dtls/key.pem")
                .into(),
            policy_secret: cfg.get_non_empty("Policy", "policy_secret").map(Into::into),
            token_secret: cfg.get_non_empty("Policy", "token_secret").map(Into::into),
            segment_count: parse_u16(cfg, "Segment", "segment_count", 3)? as usize,
            segment_duration_ms: u64::from(parse_u16(cfg, "Segment", "segment_duration_ms", 5000)?)
                .max(1),
        })
    }
}

fn parse_u16(cfg: &Config, section: &str, key: &'static str, default: u16) -> Result<u16, ConfigError> {
    match cfg.get_non_empty(section, key) {
        None => Ok(default),
        Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::BadValue {
            key,
            value: raw.to_string(),
        }),
    }
}
