
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Where session and stage records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreBackend {
    Airtable,
    Sqlite,
}

/// Which session fields make up the identity key for the novelty check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum DedupKey {
    /// Match on session start only.
    #[value(name = "start")]
    Start,
    /// Match on session start and end.
    #[default]
    #[value(name = "start-and-end")]
    StartAndEnd,
}

impl DedupKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupKey::Start => "start",
            DedupKey::StartAndEnd => "start-and-end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_filters() {
        assert_eq!(LogLevel::Debug.as_filter(), "debug");
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
    }

    #[test]
    fn test_dedup_key_value_names() {
        use clap::ValueEnum;
        assert_eq!(DedupKey::from_str("start", false), Ok(DedupKey::Start));
        assert_eq!(
            DedupKey::from_str("start-and-end", false),
            Ok(DedupKey::StartAndEnd)
        );
        assert_eq!(DedupKey::StartAndEnd.as_str(), "start-and-end");
    }
}
