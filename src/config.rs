use std::{
    env, fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
};

#[cfg(feature = "tch-backend")]
use tch::Device;

use crate::error::ServiceError;

/// Side length of the square image the model was trained on.
pub const INPUT_SIZE: u32 = 50;

/// Order in which colour channels are laid out in the input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "rgb" => Ok(Self::Rgb),
            "bgr" => Ok(Self::Bgr),
            other => Err(format!("unknown channel order '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub media_root: PathBuf,
    pub media_url: String,
    pub model_path: PathBuf,
    pub model_name: String,
    pub channel_order: ChannelOrder,
    pub body_limit_bytes: usize,
    #[cfg(feature = "tch-backend")]
    pub device: Device,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("SERVER_ADDR")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));

        let media_root = PathBuf::from(lookup("MEDIA_ROOT").unwrap_or_else(|| "media".into()));
        let media_url = normalize_media_url(&lookup("MEDIA_URL").unwrap_or_else(|| "/media/".into()));

        let model_path = PathBuf::from(
            lookup("MODEL_PATH").unwrap_or_else(|| "models/classifier.pt".to_string()),
        );
        let model_name = lookup("MODEL_NAME").unwrap_or_else(|| {
            model_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "classifier".to_string())
        });

        let channel_order = match lookup("CHANNEL_ORDER") {
            Some(raw) => raw.parse().map_err(anyhow::Error::msg)?,
            None => ChannelOrder::Bgr,
        };

        let body_limit_mb = lookup("BODY_LIMIT_MB")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(10);
        let body_limit_bytes = body_limit_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow::anyhow!("BODY_LIMIT_MB={body_limit_mb} is too large"))?;

        #[cfg(feature = "tch-backend")]
        let device = {
            let raw = lookup("DEVICE").unwrap_or_else(|| "cpu".into());
            parse_device(&raw)
        };

        Ok(Self {
            listen_addr,
            media_root,
            media_url,
            model_path,
            model_name,
            channel_order,
            body_limit_bytes,
            #[cfg(feature = "tch-backend")]
            device,
        })
    }

    /// Resolves filesystem paths once so nothing later depends on the working
    /// directory. The model file must exist; the media root is created.
    pub fn validate(mut self) -> Result<Self, ServiceError> {
        self.model_path = fs::canonicalize(&self.model_path).map_err(|err| {
            ServiceError::ModelUnavailable(format!(
                "model artifact missing at {}: {err}",
                self.model_path.display()
            ))
        })?;
        if !self.model_path.is_file() {
            return Err(ServiceError::ModelUnavailable(format!(
                "model path {} is not a file",
                self.model_path.display()
            )));
        }

        fs::create_dir_all(&self.media_root)?;
        self.media_root = fs::canonicalize(&self.media_root)?;

        Ok(self)
    }
}

fn normalize_media_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

#[cfg(feature = "tch-backend")]
fn parse_device(raw: &str) -> Device {
    let lower = raw.to_lowercase();
    if lower == "cpu" {
        Device::Cpu
    } else if lower.starts_with("cuda") {
        let idx = lower
            .split(':')
            .nth(1)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        if tch::Cuda::is_available() {
            Device::Cuda(idx)
        } else {
            tracing::warn!(requested = %raw, "CUDA unavailable, falling back to CPU");
            Device::Cpu
        }
    } else {
        Device::Cpu
    }
}
