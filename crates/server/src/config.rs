use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use vodpack_core::types::CleanupPolicy;
use vodpack_transcoder::{HwAccel, TranscoderConfig};

/// Runtime configuration, read from `VODPACK_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: String,
    pub bind_addr: String,
    pub uploads_dir: PathBuf,
    pub static_dir: PathBuf,
    pub transcoder: TranscoderConfig,
    pub max_upload_bytes: usize,
    pub cleanup: CleanupPolicy,
    /// `None` disables the periodic orphan sweep.
    pub sweep_interval: Option<Duration>,
    pub sweep_grace: Duration,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset or empty variables take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let hw_accel = get("VODPACK_HW_ACCEL")
            .map(|v| v.parse::<HwAccel>().map_err(anyhow::Error::msg))
            .transpose()
            .context("invalid VODPACK_HW_ACCEL")?;

        let transcoder = TranscoderConfig {
            ffmpeg_path: get("VODPACK_FFMPEG").unwrap_or_else(|| "ffmpeg".into()).into(),
            ffprobe_path: get("VODPACK_FFPROBE").unwrap_or_else(|| "ffprobe".into()).into(),
            hw_accel,
            ..Default::default()
        };

        let cleanup = get("VODPACK_CLEANUP")
            .map(|v| v.parse::<CleanupPolicy>().map_err(anyhow::Error::msg))
            .transpose()
            .context("invalid VODPACK_CLEANUP")?
            .unwrap_or_default();

        let max_upload_mb: usize = parse_or(&get, "VODPACK_MAX_UPLOAD_MB", 2048)?;
        let sweep_interval_secs: u64 = parse_or(&get, "VODPACK_SWEEP_INTERVAL_SECS", 0)?;
        let sweep_grace_secs: u64 = parse_or(&get, "VODPACK_SWEEP_GRACE_SECS", 3600)?;

        Ok(Self {
            db_path: get("VODPACK_DB").unwrap_or_else(|| "vodpack.db".into()),
            bind_addr: get("VODPACK_BIND").unwrap_or_else(|| "0.0.0.0:8080".into()),
            uploads_dir: get("VODPACK_UPLOAD_DIR").unwrap_or_else(|| "uploads".into()).into(),
            static_dir: get("VODPACK_STATIC_DIR").unwrap_or_else(|| "static".into()).into(),
            transcoder,
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            cleanup,
            sweep_interval: (sweep_interval_secs > 0).then(|| Duration::from_secs(sweep_interval_secs)),
            sweep_grace: Duration::from_secs(sweep_grace_secs),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(v) => v.trim().parse().with_context(|| format!("invalid {key}: '{v}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.bind_addr, "0.0.0.0:8080");
        assert_eq!(c.uploads_dir, PathBuf::from("uploads"));
        assert_eq!(c.static_dir, PathBuf::from("static"));
        assert_eq!(c.cleanup, CleanupPolicy::Retain);
        assert_eq!(c.max_upload_bytes, 2048 * 1024 * 1024);
        assert!(c.sweep_interval.is_none());
        assert!(c.transcoder.hw_accel.is_none());
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("VODPACK_CLEANUP", "remove"),
            ("VODPACK_HW_ACCEL", "nvenc"),
            ("VODPACK_SWEEP_INTERVAL_SECS", "300"),
            ("VODPACK_MAX_UPLOAD_MB", "16"),
            ("VODPACK_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
        ])
        .unwrap();
        assert_eq!(c.cleanup, CleanupPolicy::Remove);
        assert_eq!(c.transcoder.hw_accel, Some(HwAccel::Nvenc));
        assert_eq!(c.sweep_interval, Some(Duration::from_secs(300)));
        assert_eq!(c.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(c.transcoder.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(config(&[("VODPACK_CLEANUP", "shred")]).is_err());
        assert!(config(&[("VODPACK_MAX_UPLOAD_MB", "lots")]).is_err());
        assert!(config(&[("VODPACK_HW_ACCEL", "vaapi")]).is_err());
    }
}
