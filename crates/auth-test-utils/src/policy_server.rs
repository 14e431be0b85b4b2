//! In-process policy replication server
//!
//! Runs the real `PolicyReplicationService` over an in-memory store on an
//! ephemeral localhost port, so gateway tests exercise the gRPC client end
//! to end.
//!
//! # Example
//! ```rust,ignore
//! let server = TestPolicyServer::start(&[rule("p", &["alice", "/docs", "GET"])]).await;
//! let adapter = GrpcPolicyAdapter::new(ReplicationClientConfig::new(server.url()))?;
//! // ...
//! server.shutdown().await;
//! ```

use common::policy::PolicyRule;
use policy_service::{InMemoryPolicyStore, PolicyReplicationService};
use proto_gen::policy::policy_replication_server::PolicyReplicationServer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

/// Build a rule, panicking on invalid input.
pub fn rule(ptype: &str, fields: &[&str]) -> PolicyRule {
    PolicyRule::new(ptype, fields.iter().copied()).expect("test rule must be valid")
}

/// Running replication server.
pub struct TestPolicyServer {
    addr: SocketAddr,
    store: Arc<InMemoryPolicyStore>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TestPolicyServer {
    /// Start a server whose store holds `rules`.
    pub async fn start(rules: &[PolicyRule]) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("listener address");

        let store = Arc::new(InMemoryPolicyStore::with_rules(rules));
        let service = PolicyReplicationService::new(Arc::clone(&store));
        let cancel = CancellationToken::new();

        let server = Server::builder()
            .add_service(PolicyReplicationServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), {
                let cancel = cancel.clone();
                async move { cancel.cancelled().await }
            });

        let handle = tokio::spawn(async move {
            let _ = server.await;
        });

        Self {
            addr,
            store,
            cancel,
            handle,
        }
    }

    /// `http://` endpoint for `GrpcPolicyAdapter`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The backing store, for arranging and asserting state directly.
    pub fn store(&self) -> &Arc<InMemoryPolicyStore> {
        &self.store
    }

    /// Stop serving and wait for the server task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto_gen::policy::{policy_replication_client::PolicyReplicationClient, Empty};

    #[tokio::test]
    async fn test_server_serves_seeded_rules() {
        let server = TestPolicyServer::start(&[rule("p", &["alice", "doc1", "read"])]).await;

        let mut client = PolicyReplicationClient::connect(server.url())
            .await
            .expect("connect");
        let policies = client
            .load_policy(Empty {})
            .await
            .expect("load")
            .into_inner();

        assert_eq!(policies.policies.len(), 1);
        assert_eq!(policies.policies[0].rule, ["alice", "doc1", "read"]);

        server.shutdown().await;
    }
}
