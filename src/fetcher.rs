use crate::error::ScanError;
use crate::kubernetes::ClusterApi;
use crate::types::{NamespaceRef, PodRef};
use std::time::Duration;
use tracing::{debug, warn};

/// List every namespace in discovery order.
///
/// Any failure here, including exceeding `bound`, means the cluster topology
/// is unknown and the scan cannot continue.
pub async fn discover_namespaces(
    api: &dyn ClusterApi,
    bound: Duration,
) -> Result<Vec<NamespaceRef>, ScanError> {
    match tokio::time::timeout(bound, api.list_namespaces()).await {
        Ok(Ok(namespaces)) => {
            debug!("Discovered {} namespaces", namespaces.len());
            Ok(namespaces.into_iter().map(|ns| ns.name).collect())
        }
        Ok(Err(e)) => Err(ScanError::ClusterUnreachable(format!(
            "listing namespaces failed: {:#}",
            e
        ))),
        Err(_) => Err(ScanError::ClusterUnreachable(format!(
            "listing namespaces timed out after {}s",
            bound.as_secs_f64()
        ))),
    }
}

/// List pods of one namespace in discovery order. Failures are recoverable.
pub async fn list_pods(
    api: &dyn ClusterApi,
    namespace: &str,
    bound: Duration,
) -> Result<Vec<PodRef>, ScanError> {
    match tokio::time::timeout(bound, api.list_pods(namespace)).await {
        Ok(Ok(pods)) => Ok(pods),
        Ok(Err(e)) => {
            warn!(namespace, "Error getting pods: {:#}", e);
            Err(ScanError::PerCallError(format!("{:#}", e)))
        }
        Err(_) => {
            warn!(namespace, "Timed out getting pods");
            Err(ScanError::PerCallTimeout(bound))
        }
    }
}
