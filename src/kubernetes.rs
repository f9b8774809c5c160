use crate::types::{
    ControlPlaneInfo, EventInfo, LogWindow, NamespaceInfo, NamespaceRef, NodeInfo, PodRef,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event, Namespace, Node, Pod};
use kube::api::{ListParams, LogParams};
use kube::{Api, Client, ResourceExt, config};
use tracing::{debug, info};

const DEFAULT_CONTAINER_ANNOTATION: &str = "kubectl.kubernetes.io/default-container";

/// Cluster operations the scanner depends on.
///
/// Implementations do no timing of their own; callers wrap every call in a deadline.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_namespaces(&self) -> anyhow::Result<Vec<NamespaceInfo>>;

    async fn list_pods(&self, namespace: &str) -> anyhow::Result<Vec<PodRef>>;

    async fn fetch_pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        window: &LogWindow,
    ) -> anyhow::Result<String>;

    async fn cluster_info(&self) -> anyhow::Result<ControlPlaneInfo>;

    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeInfo>>;

    /// The `limit` most recent events by last transition time.
    async fn list_events(&self, limit: usize) -> anyhow::Result<Vec<EventInfo>>;
}

/// [`ClusterApi`] backed by the kube client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    cluster_url: String,
}

impl KubeCluster {
    /// Connect using the current kubeconfig context, or `context` when given.
    pub async fn connect(context: Option<&str>) -> anyhow::Result<Self> {
        let config = match context {
            Some(ctx) => config::Config::from_kubeconfig(&config::KubeConfigOptions {
                context: Some(ctx.to_string()),
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow::anyhow!("Context '{}' not found in kubeconfig: {}", ctx, e))?,
            None => config::Config::infer()
                .await
                .context("Failed to infer Kubernetes config")?,
        };

        let cluster_url = config.cluster_url.to_string();
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        info!("Using cluster at {}", cluster_url);
        Ok(Self {
            client,
            cluster_url,
        })
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_namespaces(&self) -> anyhow::Result<Vec<NamespaceInfo>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(namespace_info).collect())
    }

    async fn list_pods(&self, namespace: &str) -> anyhow::Result<Vec<PodRef>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|p| p.name_any()).collect())
    }

    async fn fetch_pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        window: &LogWindow,
    ) -> anyhow::Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let container = default_container(&api.get(pod).await?);
        let lp = LogParams {
            container,
            since_seconds: window.since.map(|d| d.as_secs().max(1) as i64),
            tail_lines: Some(window.tail_lines),
            ..Default::default()
        };
        debug!(namespace, pod, container = ?lp.container, "Fetching pod logs");
        Ok(api.logs(pod, &lp).await?)
    }

    async fn cluster_info(&self) -> anyhow::Result<ControlPlaneInfo> {
        let version = self.client.apiserver_version().await?;
        Ok(ControlPlaneInfo {
            endpoint: self.cluster_url.clone(),
            version: Some(version.git_version),
        })
    }

    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeInfo>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(node_info).collect())
    }

    async fn list_events(&self, limit: usize) -> anyhow::Result<Vec<EventInfo>> {
        let api: Api<Event> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        let mut events: Vec<EventInfo> = list.items.iter().map(event_info).collect();
        events.sort_by_key(|e| e.last_seen);
        let skip = events.len().saturating_sub(limit);
        Ok(events.split_off(skip))
    }
}

/// The container whose logs represent the pod: the one named by the
/// default-container annotation when it exists, otherwise the first declared.
fn default_container(pod: &Pod) -> Option<String> {
    let containers = &pod.spec.as_ref()?.containers;
    pod.annotations()
        .get(DEFAULT_CONTAINER_ANNOTATION)
        .filter(|name| containers.iter().any(|c| &c.name == *name))
        .cloned()
        .or_else(|| containers.first().map(|c| c.name.clone()))
}

/// k8s-openapi timestamps serialize as RFC 3339; go through that form.
fn to_utc<T: serde::Serialize>(time: &T) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time).ok()?;
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn namespace_info(ns: &Namespace) -> NamespaceInfo {
    NamespaceInfo {
        name: NamespaceRef::from(ns.name_any()),
        phase: ns.status.as_ref().and_then(|s| s.phase.clone()),
        created: ns.metadata.creation_timestamp.as_ref().and_then(to_utc),
    }
}

fn node_info(node: &Node) -> NodeInfo {
    let status = node.status.as_ref();
    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
        .map(|c| c.status == "True")
        .unwrap_or(false);
    let mut readiness = if ready { "Ready" } else { "NotReady" }.to_string();
    if node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false)
    {
        readiness.push_str(",SchedulingDisabled");
    }

    let roles = node
        .labels()
        .keys()
        .filter_map(|k| k.strip_prefix("node-role.kubernetes.io/"))
        .filter(|r| !r.is_empty())
        .collect::<Vec<_>>()
        .join(",");

    let internal_ip = status
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addrs| addrs.iter().find(|a| a.type_ == "InternalIP"))
        .map(|a| a.address.clone())
        .unwrap_or_else(|| "<none>".to_string());

    let info = status.and_then(|s| s.node_info.as_ref());

    NodeInfo {
        name: node.name_any(),
        status: readiness,
        roles: if roles.is_empty() {
            "<none>".to_string()
        } else {
            roles
        },
        created: node.metadata.creation_timestamp.as_ref().and_then(to_utc),
        version: info.map(|i| i.kubelet_version.clone()).unwrap_or_default(),
        internal_ip,
        os_image: info.map(|i| i.os_image.clone()).unwrap_or_default(),
        kernel_version: info.map(|i| i.kernel_version.clone()).unwrap_or_default(),
        container_runtime: info
            .map(|i| i.container_runtime_version.clone())
            .unwrap_or_default(),
    }
}

fn event_info(event: &Event) -> EventInfo {
    let last_seen = event
        .last_timestamp
        .as_ref()
        .and_then(to_utc)
        .or_else(|| event.event_time.as_ref().and_then(to_utc))
        .or_else(|| event.metadata.creation_timestamp.as_ref().and_then(to_utc));

    let object = format!(
        "{}/{}",
        event
            .involved_object
            .kind
            .as_deref()
            .unwrap_or("Unknown")
            .to_lowercase(),
        event.involved_object.name.as_deref().unwrap_or("<unknown>")
    );

    EventInfo {
        namespace: event.namespace().unwrap_or_default(),
        last_seen,
        event_type: event.type_.clone().unwrap_or_default(),
        reason: event.reason.clone().unwrap_or_default(),
        object,
        message: event
            .message
            .as_deref()
            .unwrap_or_default()
            .replace('\n', " "),
    }
}
