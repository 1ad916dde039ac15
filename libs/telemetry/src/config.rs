use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl LogFormat {
    /// `json` selects JSON lines; anything else (or unset) is plain text.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Plain,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            format: LogFormat::default(),
            default_filter: "info".to_string(),
        }
    }

    pub fn from_env(service_name: &str) -> Self {
        let mut cfg = Self::new(service_name);
        if let Ok(raw) = env::var("LOG_FORMAT") {
            cfg.format = LogFormat::parse(&raw);
        }
        cfg
    }

    pub fn json_logs(&self) -> bool {
        self.format == LogFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_json_selects_json() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" json "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Plain);
        assert_eq!(LogFormat::parse(""), LogFormat::Plain);
    }

    #[test]
    fn defaults_to_info_plain() {
        let cfg = TelemetryConfig::new("e2e-bridge");
        assert_eq!(cfg.default_filter, "info");
        assert!(!cfg.json_logs());
    }
}
