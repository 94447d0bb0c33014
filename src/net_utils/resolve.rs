use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::lookup_host;

use crate::model::Family;

#[derive(Debug, Error)]
pub(crate) enum ResolveError {
    #[error("{0}: {1}")]
    Lookup(String, #[source] io::Error),
    #[error("no suitable {family} address found for {addr}")]
    NoAddress { addr: String, family: Family },
}

/// `host:port`を解決し、指定したファミリーの最初のアドレスを返す
pub(crate) async fn resolve(addr: &str, family: Family) -> Result<SocketAddr, ResolveError> {
    lookup_host(addr)
        .await
        .map_err(|e| ResolveError::Lookup(addr.to_string(), e))?
        .find(|resolved| family.accepts(resolved))
        .ok_or_else(|| ResolveError::NoAddress {
            addr: addr.to_string(),
            family,
        })
}

/// ローカルアドレスを解決する
///
/// 空の場合はbindしないことを表す`None`
pub(crate) async fn resolve_local(
    addr: &str,
    family: Family,
) -> Result<Option<SocketAddr>, ResolveError> {
    if addr.is_empty() {
        return Ok(None);
    }
    resolve(addr, family).await.map(Some)
}
