//! Pod directory backed by the Kubernetes API.

use super::{DirectoryFuture, PodDirectory};
use crate::error::{PilotError, PilotResult};
use crate::pod::{LabelSelector, PodRecord};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use std::future::Future;
use tokio::sync::OnceCell;

/// Directory over the pods of one namespace.
///
/// The client is created on first use. Concurrent first callers share a
/// single initialization; a failed attempt leaves the cell empty so the next
/// call tries again.
pub struct KubeDirectory {
    namespace: String,
    client: OnceCell<Client>,
}

impl KubeDirectory {
    /// Create a directory that builds its client lazily from the ambient
    /// configuration (in-cluster service account or kubeconfig).
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            client: OnceCell::new(),
        }
    }

    /// Create a directory around an existing client.
    pub fn with_client(namespace: impl Into<String>, client: Client) -> Self {
        Self {
            namespace: namespace.into(),
            client: OnceCell::new_with(Some(client)),
        }
    }

    async fn client_with<F, Fut>(&self, connect: F) -> PilotResult<&Client>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PilotResult<Client>>,
    {
        self.client.get_or_try_init(connect).await
    }

    async fn pods(&self) -> PilotResult<Api<Pod>> {
        let client = self
            .client_with(|| async {
                tracing::debug!(namespace = %self.namespace, "Initializing Kubernetes client");
                Client::try_default()
                    .await
                    .map_err(|e| PilotError::ClientInit(e.to_string()))
            })
            .await?;
        Ok(Api::namespaced(client.clone(), &self.namespace))
    }

    async fn list_pods(&self, selector: &LabelSelector) -> PilotResult<Vec<PodRecord>> {
        let pods = self.pods().await?;

        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_query());
        }

        let list = pods.list(&params).await?;
        tracing::trace!(selector = %selector, count = list.items.len(), "Listed pods");
        Ok(list.items.iter().map(PodRecord::from).collect())
    }

    async fn update_pod(&self, pod: &PodRecord) -> PilotResult<PodRecord> {
        let pods = self.pods().await?;

        // Carrying the resourceVersion turns the merge patch into a
        // conditional write: the API server answers 409 if it moved on.
        let mut metadata = serde_json::json!({ "labels": pod.labels });
        if let Some(version) = &pod.resource_version {
            metadata["resourceVersion"] = serde_json::Value::String(version.clone());
        }
        let patch = serde_json::json!({ "metadata": metadata });

        match pods
            .patch(&pod.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(updated) => Ok(PodRecord::from(&updated)),
            Err(kube::Error::Api(err)) if err.code == 409 => Err(PilotError::Conflict {
                pod: pod.name.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl PodDirectory for KubeDirectory {
    fn list<'a>(&'a self, selector: &'a LabelSelector) -> DirectoryFuture<'a, Vec<PodRecord>> {
        Box::pin(self.list_pods(selector))
    }

    fn update<'a>(&'a self, pod: &'a PodRecord) -> DirectoryFuture<'a, PodRecord> {
        Box::pin(self.update_pod(pod))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::{MASTER_LABEL, PodPhase};
    use http::{Method, Request, Response, StatusCode};
    use http_body_util::BodyExt;
    use kube::client::Body;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A request as seen by the fake API server.
    #[derive(Debug, Clone)]
    struct Seen {
        method: Method,
        uri: String,
        content_type: Option<String>,
        body: Vec<u8>,
    }

    impl Seen {
        fn json(&self) -> Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    /// Client whose every request is answered with `status` and `reply`.
    fn fake_client(status: StatusCode, reply: Value) -> (Client, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();

        let service = tower::service_fn(move |req: Request<Body>| {
            let recorder = recorder.clone();
            let reply = reply.clone();
            async move {
                let (parts, body) = req.into_parts();
                let body = body.collect().await?.to_bytes();
                recorder.lock().push(Seen {
                    method: parts.method,
                    uri: parts.uri.to_string(),
                    content_type: parts
                        .headers
                        .get(http::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    body: body.to_vec(),
                });

                let response = Response::builder()
                    .status(status)
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&reply)?))?;
                Ok::<_, tower::BoxError>(response)
            }
        });

        (Client::new(service, "default"), seen)
    }

    fn pod_json(name: &str, version: &str, labels: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": name,
                "namespace": "redis",
                "resourceVersion": version,
                "labels": labels,
            },
            "status": { "phase": "Running", "podIP": "10.0.0.5" },
        })
    }

    fn status_json(code: u16, reason: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Status",
            "metadata": {},
            "status": "Failure",
            "message": format!("pods \"redis-0\": {}", reason),
            "reason": reason,
            "code": code,
        })
    }

    #[tokio::test]
    async fn test_list_filters_by_selector() {
        let reply = json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": { "resourceVersion": "12" },
            "items": [pod_json("redis-0", "7", json!({ "app": "redis" }))],
        });
        let (client, seen) = fake_client(StatusCode::OK, reply);
        let directory = KubeDirectory::with_client("redis", client);

        let selector = LabelSelector::new([("app".to_string(), "redis".to_string())]);
        let pods = directory.list(&selector).await.unwrap();

        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name, "redis-0");
        assert_eq!(pods[0].phase, PodPhase::Running);
        assert!(pods[0].has_ip("10.0.0.5"));
        assert_eq!(pods[0].resource_version.as_deref(), Some("7"));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::GET);
        assert!(seen[0].uri.starts_with("/api/v1/namespaces/redis/pods"));
        assert!(seen[0].uri.contains("labelSelector=app%3Dredis"));
    }

    #[tokio::test]
    async fn test_list_without_selector_lists_namespace() {
        let reply = json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": {},
            "items": [],
        });
        let (client, seen) = fake_client(StatusCode::OK, reply);
        let directory = KubeDirectory::with_client("redis", client);

        let pods = directory.list(&LabelSelector::default()).await.unwrap();
        assert!(pods.is_empty());
        assert!(!seen.lock()[0].uri.contains("labelSelector"));
    }

    #[tokio::test]
    async fn test_update_sends_conditional_merge_patch() {
        let reply = pod_json("redis-0", "8", json!({ "app": "redis", "master": "true" }));
        let (client, seen) = fake_client(StatusCode::OK, reply);
        let directory = KubeDirectory::with_client("redis", client);

        let mut pod = PodRecord::new("redis-0", PodPhase::Running)
            .with_ip("10.0.0.5")
            .with_label("app", "redis")
            .with_master_label();
        pod.resource_version = Some("7".to_string());

        let updated = directory.update(&pod).await.unwrap();
        assert!(updated.is_marked_master());
        assert_eq!(updated.resource_version.as_deref(), Some("8"));

        let seen = seen.lock();
        assert_eq!(seen[0].method, Method::PATCH);
        assert!(seen[0].uri.starts_with("/api/v1/namespaces/redis/pods/redis-0"));
        assert_eq!(
            seen[0].content_type.as_deref(),
            Some("application/merge-patch+json")
        );

        let body = seen[0].json();
        assert_eq!(body["metadata"]["resourceVersion"], "7");
        assert_eq!(body["metadata"]["labels"][MASTER_LABEL], "true");
        assert_eq!(body["metadata"]["labels"]["app"], "redis");
    }

    #[tokio::test]
    async fn test_update_without_version_is_unconditional() {
        let reply = pod_json("redis-0", "8", json!({ "master": "true" }));
        let (client, seen) = fake_client(StatusCode::OK, reply);
        let directory = KubeDirectory::with_client("redis", client);

        let pod = PodRecord::new("redis-0", PodPhase::Running).with_master_label();
        directory.update(&pod).await.unwrap();

        let body = seen.lock()[0].json();
        assert!(body["metadata"].get("resourceVersion").is_none());
    }

    #[tokio::test]
    async fn test_stale_update_is_conflict() {
        let (client, _) = fake_client(StatusCode::CONFLICT, status_json(409, "Conflict"));
        let directory = KubeDirectory::with_client("redis", client);

        let mut pod = PodRecord::new("redis-0", PodPhase::Running).with_master_label();
        pod.resource_version = Some("3".to_string());

        match directory.update(&pod).await {
            Err(PilotError::Conflict { pod }) => assert_eq!(pod, "redis-0"),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_api_errors_pass_through() {
        let (client, _) = fake_client(StatusCode::NOT_FOUND, status_json(404, "NotFound"));
        let directory = KubeDirectory::with_client("redis", client);

        let pod = PodRecord::new("redis-0", PodPhase::Running).with_master_label();
        let err = directory.update(&pod).await.unwrap_err();
        assert!(matches!(err, PilotError::Kube(kube::Error::Api(ref e)) if e.code == 404));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_client_initialized_once() {
        let (client, _) = fake_client(StatusCode::OK, json!({}));
        let directory = KubeDirectory::new("redis");
        let calls = AtomicUsize::new(0);

        let (calls_ref, client_ref) = (&calls, &client);
        let connect = move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<_, PilotError>(client_ref.clone())
        };

        let (first, second) = tokio::join!(
            directory.client_with(connect),
            directory.client_with(connect)
        );
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(directory.client_with(connect).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_client_init_is_retried() {
        let (client, _) = fake_client(StatusCode::OK, json!({}));
        let directory = KubeDirectory::new("redis");
        let calls = AtomicUsize::new(0);

        let err = directory
            .client_with(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PilotError::ClientInit("no service account".into()))
            })
            .await
            .err().unwrap();
        assert!(err.is_client_init());
        assert!(directory.client.get().is_none());

        let result = directory
            .client_with(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(client.clone())
            })
            .await;
        assert!(result.is_ok());
        assert!(directory.client.get().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
