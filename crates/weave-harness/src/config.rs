use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use weave_core::EndpointAddr;

/// 演示部署选用的传输种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
    Quic,
}

impl FromStr for TransportKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "quic" => Ok(Self::Quic),
            _ => Err(()),
        }
    }
}

/// pingpong 演示程序的部署配置。
///
/// 来源有两层：可选的 TOML 文件提供基线，命令行 `key=value` 逐项覆盖。
/// 缺省值对应本机回环上的 TCP 部署。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// 传输种类：tcp、udp 或 quic。
    pub transport: TransportKind,
    /// 客户端的目标地址，或服务器的绑定地址（空串表示全部接口）。
    pub address: String,
    /// 端口号。
    pub port: u16,
    /// 客户端每秒发出的探测包数量。
    pub rate: u32,
    /// 空闲回收阈值，毫秒。
    pub idle_threshold_ms: u64,
    /// 看门狗轮询间隔，毫秒。
    pub poll_interval_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            address: "127.0.0.1".into(),
            port: 10071,
            rate: 10,
            idle_threshold_ms: 30_000,
            poll_interval_ms: 1_000,
        }
    }
}

/// 配置装载与覆盖阶段的错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),

    #[error("override must look like key=value: {0}")]
    Malformed(String),

    #[error("unknown override key: {0}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

impl HarnessConfig {
    /// 按演示程序的命令行约定装载配置。
    ///
    /// 首个不含 `=` 的参数视作 TOML 配置文件路径，其余参数均为
    /// `key=value` 覆盖项，按出现顺序生效。
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut path: Option<String> = None;
        let mut overrides = Vec::new();
        for arg in args {
            if arg.contains('=') {
                overrides.push(arg);
            } else if path.is_none() {
                path = Some(arg);
            } else {
                return Err(ConfigError::Malformed(arg));
            }
        }
        let mut cfg = Self::load(path.as_deref().map(Path::new))?;
        cfg.apply_args(overrides)?;
        Ok(cfg)
    }

    /// 从可选的 TOML 文件装载配置；无文件时返回缺省值。
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// 应用一批 `key=value` 覆盖项。
    pub fn apply_args<I>(&mut self, args: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        for arg in args {
            let Some((key, value)) = arg.split_once('=') else {
                return Err(ConfigError::Malformed(arg));
            };
            self.apply_override(key, value)?;
        }
        Ok(())
    }

    fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        fn invalid(key: &str, value: &str) -> ConfigError {
            ConfigError::InvalidValue {
                key: key.into(),
                value: value.into(),
            }
        }
        match key {
            "transport" => {
                self.transport = value.parse().map_err(|_| invalid(key, value))?;
            }
            "address" => self.address = value.into(),
            "port" => self.port = value.parse().map_err(|_| invalid(key, value))?,
            "rate" => self.rate = value.parse().map_err(|_| invalid(key, value))?,
            "idle_threshold_ms" => {
                self.idle_threshold_ms = value.parse().map_err(|_| invalid(key, value))?;
            }
            "poll_interval_ms" => {
                self.poll_interval_ms = value.parse().map_err(|_| invalid(key, value))?;
            }
            _ => return Err(ConfigError::UnknownKey(key.into())),
        }
        Ok(())
    }

    /// 配置描述的端点。
    pub fn endpoint(&self) -> EndpointAddr {
        EndpointAddr::new(self.address.clone(), self.port)
    }

    /// 空闲回收阈值。
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    /// 看门狗轮询间隔。
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_defaults() {
        let cfg: HarnessConfig =
            toml::from_str("transport = \"quic\"\nport = 10074\n").expect("valid toml");
        assert_eq!(cfg.transport, TransportKind::Quic);
        assert_eq!(cfg.port, 10074);
        // 未出现的键保持缺省。
        assert_eq!(cfg.rate, 10);
    }

    #[test]
    fn args_override_and_reject_garbage() {
        let mut cfg = HarnessConfig::default();
        cfg.apply_args(["transport=udp".into(), "port=9100".into()])
            .expect("valid overrides");
        assert_eq!(cfg.transport, TransportKind::Udp);
        assert_eq!(cfg.port, 9100);

        assert!(cfg.apply_args(["port".into()]).is_err());
        assert!(cfg.apply_args(["no_such_key=1".into()]).is_err());
        assert!(cfg.apply_args(["port=notanumber".into()]).is_err());
    }
}
