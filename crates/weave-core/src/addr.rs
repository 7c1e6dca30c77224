use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use thiserror::Error;

/// `EndpointAddr` 以字符串地址加端口描述一个本地或远端套接字端点。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - **统一表达**：客户端建连目标、服务器绑定目标与对端元数据共用同一结构，
///   避免各传输实现私自约定地址格式。
/// - **通配语义**：空地址表示“绑定所有本地接口”，仅服务器角色可用；该约定由
///   [`EndpointAddr::to_socket_addr`] 落地为 `0.0.0.0`。
///
/// ## 契约（What）
/// - `address`：IPv4/IPv6 字面量或空串；构造后不可变；
/// - `port`：主机序端口号；
/// - `Display` 输出 `addr:port`，适合日志与注册表键使用。
///
/// ## 注意事项（Trade-offs）
/// - 不做域名解析，地址必须是 IP 字面量；需要解析时由调用方先行完成，
///   与底层实现保持一致。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointAddr {
    address: String,
    port: u16,
}

/// 端点字符串无法解析为合法 IP 时返回的错误。
#[derive(Debug, Error)]
#[error("invalid endpoint address: {0}")]
pub struct InvalidEndpoint(pub String);

impl EndpointAddr {
    /// 构造指向具体地址的端点。
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// 构造“绑定所有接口”的服务器端点。
    pub fn bind_all(port: u16) -> Self {
        Self {
            address: String::new(),
            port,
        }
    }

    /// 地址部分；空串表示通配绑定。
    pub fn address(&self) -> &str {
        &self.address
    }

    /// 端口部分。
    pub fn port(&self) -> u16 {
        self.port
    }

    /// 是否为通配绑定端点。
    pub fn is_wildcard(&self) -> bool {
        self.address.is_empty()
    }

    /// 转换为标准库 `SocketAddr`。
    ///
    /// - 空地址映射为 `0.0.0.0`（仅服务器绑定场景有意义）；
    /// - 其余必须是 IPv4/IPv6 字面量，否则返回 [`InvalidEndpoint`]。
    pub fn to_socket_addr(&self) -> Result<SocketAddr, InvalidEndpoint> {
        if self.address.is_empty() {
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port));
        }
        let ip: IpAddr = self
            .address
            .parse()
            .map_err(|_| InvalidEndpoint(self.address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl From<SocketAddr> for EndpointAddr {
    fn from(addr: SocketAddr) -> Self {
        Self {
            address: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_binds_all_interfaces() {
        let ep = EndpointAddr::bind_all(9000);
        assert!(ep.is_wildcard());
        let addr = ep.to_socket_addr().expect("wildcard must resolve");
        assert_eq!(addr, "0.0.0.0:9000".parse().unwrap());
    }

    #[test]
    fn literal_round_trip() {
        let ep = EndpointAddr::new("127.0.0.1", 9000);
        let addr = ep.to_socket_addr().expect("literal must resolve");
        assert_eq!(EndpointAddr::from(addr), ep);
        assert_eq!(ep.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn hostname_is_rejected() {
        let err = EndpointAddr::new("localhost", 9000)
            .to_socket_addr()
            .expect_err("hostnames are not resolved");
        assert!(err.to_string().contains("localhost"));
    }
}
