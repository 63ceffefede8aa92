use std::path::PathBuf;

// Wheel input errors. None of these escape `update_inputs`; the device layer degrades
// them to neutral readings at the trait boundary.
#[derive(Debug, thiserror::Error)]
pub enum WheelError {
    #[error("Device unavailable at {path}: {reason}")]
    DeviceUnavailable { path: String, reason: String },

    #[error("Axis not bound: {0}")]
    AxisUnbound(String),

    #[error("Failed to initialize input backend: {0}")]
    BackendInitialization(String),

    #[error("Force feedback error: {0}")]
    ForceFeedback(String),

    #[error("Device reader error: {0}")]
    Reader(String),
}

// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No configuration directory available on this host")]
    NoConfigDir,
}
