//! Mock provisioning API for E2E tests
//!
//! Serves both the platform endpoints (temporary auth tokens) and the add-on
//! endpoints (ad-hoc SSH and DB users) from one local HTTP server, records
//! every request, and answers with configurable replies.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::mock_provisioner::{
    FAKE_DB_NAME, FAKE_DB_PASSWORD, FAKE_DB_READONLY_USERNAME, FAKE_SSH_HOST, FAKE_SSH_HOST_KEY,
    FAKE_SSH_PRIVATE_KEY, FAKE_SSH_USERNAME,
};

pub const FAKE_AUTH_ID: &str = "my-fake-auth-id";
pub const FAKE_ACCESS_TOKEN: &str = "my-fake-access-token";
pub const FAKE_PG_HOST: &str = "my-fake-pg-hostname";

/// A canned HTTP response
#[derive(Clone, Debug)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
}

impl MockReply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

/// A recorded request for test assertions
#[derive(Clone, Debug)]
pub struct RecordedApiRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub accept: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedApiRequest {
    pub fn json_body(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Debug)]
struct Replies {
    auth: MockReply,
    revoke: MockReply,
    ssh: MockReply,
    db: MockReply,
}

impl Default for Replies {
    fn default() -> Self {
        Self {
            auth: MockReply::json(
                201,
                json!({"id": FAKE_AUTH_ID, "access_token": {"token": FAKE_ACCESS_TOKEN}}),
            ),
            revoke: MockReply::json(200, json!({})),
            ssh: MockReply::json(
                200,
                json!({
                    "sshHost": FAKE_SSH_HOST,
                    "sshUsername": FAKE_SSH_USERNAME,
                    "sshPrivateKey": FAKE_SSH_PRIVATE_KEY,
                    "publicSshHostKey": FAKE_SSH_HOST_KEY,
                }),
            ),
            db: MockReply::json(
                200,
                json!({
                    "dbHost": FAKE_PG_HOST,
                    "dbName": FAKE_DB_NAME,
                    "dbUsername": FAKE_DB_READONLY_USERNAME,
                    "dbPassword": FAKE_DB_PASSWORD,
                }),
            ),
        }
    }
}

/// A mock provisioning API server
pub struct MockProvisioningApi {
    addr: SocketAddr,
    requests: Arc<RwLock<Vec<RecordedApiRequest>>>,
    replies: Arc<RwLock<Replies>>,
}

impl MockProvisioningApi {
    /// Start the mock API on an ephemeral port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock provisioning API");
        let addr = listener.local_addr().unwrap();

        let requests: Arc<RwLock<Vec<RecordedApiRequest>>> = Arc::new(RwLock::new(Vec::new()));
        let replies = Arc::new(RwLock::new(Replies::default()));

        let requests_clone = requests.clone();
        let replies_clone = replies.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                let requests = requests_clone.clone();
                let replies = replies_clone.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let requests = requests.clone();
                        let replies = replies.clone();
                        async move {
                            let method = req.method().clone();
                            let path = req.uri().path().to_string();
                            let header = |name: &str| {
                                req.headers()
                                    .get(name)
                                    .and_then(|v| v.to_str().ok())
                                    .map(str::to_string)
                            };
                            let authorization = header("authorization");
                            let accept = header("accept");

                            let body = req
                                .into_body()
                                .collect()
                                .await
                                .map(|b| b.to_bytes().to_vec())
                                .unwrap_or_default();

                            let reply = route(&replies.read(), &method, &path);

                            requests.write().push(RecordedApiRequest {
                                method: method.to_string(),
                                path,
                                authorization,
                                accept,
                                body,
                            });

                            let status = StatusCode::from_u16(reply.status)
                                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                            Ok::<_, Infallible>(
                                Response::builder()
                                    .status(status)
                                    .header("content-type", "application/json")
                                    .body(Full::new(Bytes::from(reply.body)))
                                    .unwrap(),
                            )
                        }
                    });

                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            addr,
            requests,
            replies,
        }
    }

    /// Base URL, usable for both the platform and the add-on API
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedApiRequest> {
        self.requests.read().clone()
    }

    /// Requests with the given method whose path ends with `suffix`
    pub fn requests_to(&self, method: &str, suffix: &str) -> Vec<RecordedApiRequest> {
        self.requests
            .read()
            .iter()
            .filter(|r| r.method == method && r.path.ends_with(suffix))
            .cloned()
            .collect()
    }

    /// Number of DELETE requests against the authorizations endpoint
    pub fn revocation_count(&self) -> usize {
        self.requests
            .read()
            .iter()
            .filter(|r| r.method == "DELETE" && r.path.starts_with("/oauth/authorizations/"))
            .count()
    }

    pub fn set_auth_reply(&self, reply: MockReply) {
        self.replies.write().auth = reply;
    }

    pub fn set_revoke_reply(&self, reply: MockReply) {
        self.replies.write().revoke = reply;
    }

    pub fn set_ssh_reply(&self, reply: MockReply) {
        self.replies.write().ssh = reply;
    }

    pub fn set_db_reply(&self, reply: MockReply) {
        self.replies.write().db = reply;
    }
}

fn route(replies: &Replies, method: &Method, path: &str) -> MockReply {
    match (method, path) {
        (&Method::POST, "/oauth/authorizations") => replies.auth.clone(),
        (&Method::DELETE, p) if p.starts_with("/oauth/authorizations/") => replies.revoke.clone(),
        (&Method::POST, p) if p.starts_with("/heroku/resources/") && p.ends_with("/adhoc-ssh-users") => {
            replies.ssh.clone()
        }
        (&Method::POST, p) if p.starts_with("/heroku/resources/") && p.ends_with("/adhoc-db-users") => {
            replies.db.clone()
        }
        _ => MockReply::json(404, json!({"reason": "No such route"})),
    }
}
