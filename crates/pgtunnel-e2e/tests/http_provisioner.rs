//! HTTP provisioner tests against a mock provisioning API

use pgtunnel_common::{AccessMode, ProvisionError};
use pgtunnel_e2e::mock_api::{FAKE_ACCESS_TOKEN, FAKE_AUTH_ID, FAKE_PG_HOST};
use pgtunnel_e2e::mock_provisioner::{FAKE_SSH_HOST, FAKE_SSH_HOST_KEY, FAKE_SSH_USERNAME};
use pgtunnel_e2e::{MockProvisioningApi, MockReply, TEST_ADDON};
use pgtunnel_provision::{provision_credentials, HttpProvisioner, ProvisionerConfig};
use serde_json::json;

const OPERATOR_TOKEN: &str = "operator-api-token";

fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pgtunnel_provision=debug")
        .with_test_writer()
        .try_init();
}

fn provisioner_for(api: &MockProvisioningApi) -> HttpProvisioner {
    HttpProvisioner::new(ProvisionerConfig {
        platform_api_url: api.url(),
        addon_api_url: api.url(),
        api_token: OPERATOR_TOKEN.to_string(),
    })
}

#[tokio::test]
async fn test_provisions_with_defaults_and_revokes() {
    init_test();

    let api = MockProvisioningApi::start().await;
    let provisioner = provisioner_for(&api);

    let creds = provision_credentials(&provisioner, TEST_ADDON, AccessMode::ReadOnly)
        .await
        .unwrap();

    assert_eq!(creds.ssh.host, FAKE_SSH_HOST);
    assert_eq!(creds.ssh.port, 22);
    assert_eq!(creds.ssh.username, FAKE_SSH_USERNAME);
    assert_eq!(creds.ssh.host_key, FAKE_SSH_HOST_KEY);
    assert_eq!(creds.db.host, FAKE_PG_HOST);
    assert_eq!(creds.db.port, 5432);
    assert_eq!(creds.db.access_mode, AccessMode::ReadOnly);

    // Token request carries the operator's own credentials
    let auth = api.requests_to("POST", "/oauth/authorizations");
    assert_eq!(auth.len(), 1);
    assert_eq!(
        auth[0].authorization.as_deref(),
        Some(format!("Bearer {}", OPERATOR_TOKEN).as_str())
    );
    assert_eq!(
        auth[0].accept.as_deref(),
        Some("application/vnd.heroku+json; version=3")
    );
    let body = auth[0].json_body();
    assert_eq!(body["expires_in"], 180);
    assert_eq!(body["scope"], json!(["read", "identity"]));

    // Add-on calls carry the temporary token
    let expected = format!("Bearer {}", FAKE_ACCESS_TOKEN);
    let ssh = api.requests_to("POST", "/adhoc-ssh-users");
    assert_eq!(ssh.len(), 1);
    assert_eq!(
        ssh[0].path,
        format!("/heroku/resources/{}/adhoc-ssh-users", TEST_ADDON)
    );
    assert_eq!(ssh[0].authorization.as_deref(), Some(expected.as_str()));

    let db = api.requests_to("POST", "/adhoc-db-users");
    assert_eq!(db.len(), 1);
    assert_eq!(db[0].authorization.as_deref(), Some(expected.as_str()));
    assert_eq!(db[0].json_body(), json!({"enableWriteAccess": false}));

    // Revoked by id, with the operator's credentials
    let revokes = api.requests_to("DELETE", &format!("/oauth/authorizations/{}", FAKE_AUTH_ID));
    assert_eq!(revokes.len(), 1);
    assert_eq!(
        revokes[0].authorization.as_deref(),
        Some(format!("Bearer {}", OPERATOR_TOKEN).as_str())
    );
    assert_eq!(api.revocation_count(), 1);
}

#[tokio::test]
async fn test_explicit_ports_and_write_access() {
    init_test();

    let api = MockProvisioningApi::start().await;
    api.set_ssh_reply(MockReply::json(
        200,
        json!({
            "sshHost": FAKE_SSH_HOST,
            "sshPort": 50022,
            "sshUsername": FAKE_SSH_USERNAME,
            "sshPrivateKey": "key",
            "publicSshHostKey": FAKE_SSH_HOST_KEY,
        }),
    ));
    api.set_db_reply(MockReply::json(
        200,
        json!({
            "dbHost": FAKE_PG_HOST,
            "dbPort": 15432,
            "dbName": "fake_db",
            "dbUsername": "rw_db_test_user",
            "dbPassword": "secret",
        }),
    ));

    let provisioner = provisioner_for(&api);
    let creds = provision_credentials(&provisioner, TEST_ADDON, AccessMode::ReadWrite)
        .await
        .unwrap();

    assert_eq!(creds.ssh.port, 50022);
    assert_eq!(creds.db.port, 15432);
    assert_eq!(creds.db.access_mode, AccessMode::ReadWrite);

    let db = api.requests_to("POST", "/adhoc-db-users");
    assert_eq!(db[0].json_body(), json!({"enableWriteAccess": true}));
    assert_eq!(api.revocation_count(), 1);
}

#[tokio::test]
async fn test_addon_status_codes() {
    init_test();

    let cases: Vec<(MockReply, fn(&ProvisionError) -> bool)> = vec![
        (
            MockReply::json(404, json!({"reason": "Not found"})),
            |e| matches!(e, ProvisionError::NotFound { .. }),
        ),
        (
            MockReply::json(422, json!({"reason": "Not ready"})),
            |e| matches!(e, ProvisionError::NotReady { .. }),
        ),
        (
            MockReply::json(503, json!({"reason": "Down for maintenance"})),
            |e| matches!(e, ProvisionError::Unavailable { .. }),
        ),
        (
            MockReply::raw(500, "<html>oops</html>"),
            |e| matches!(e, ProvisionError::Unavailable { .. }),
        ),
        (
            MockReply::raw(200, "not json"),
            |e| matches!(e, ProvisionError::Unavailable { .. }),
        ),
    ];

    for (reply, expected) in cases {
        let api = MockProvisioningApi::start().await;
        api.set_ssh_reply(reply.clone());

        let provisioner = provisioner_for(&api);
        let err = provision_credentials(&provisioner, TEST_ADDON, AccessMode::ReadOnly)
            .await
            .unwrap_err();

        assert!(expected(&err), "reply {:?} gave {:?}", reply, err);
        assert!(api.requests_to("POST", "/adhoc-db-users").is_empty());
        assert_eq!(api.revocation_count(), 1, "reply {:?}", reply);
    }
}

#[tokio::test]
async fn test_operator_facing_messages() {
    init_test();

    let api = MockProvisioningApi::start().await;
    api.set_db_reply(MockReply::json(404, json!({"reason": "Not found"})));
    let err = provision_credentials(&provisioner_for(&api), TEST_ADDON, AccessMode::ReadOnly)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "Add-on {} was not found or is not a Borealis Isolated Postgres add-on",
            TEST_ADDON
        )
    );
    assert_eq!(api.revocation_count(), 1);

    // Server-supplied reasons stay out of the message
    let api = MockProvisioningApi::start().await;
    api.set_db_reply(MockReply::json(503, json!({"reason": "internal detail"})));
    let err = provision_credentials(&provisioner_for(&api), TEST_ADDON, AccessMode::ReadOnly)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Add-on service is temporarily unavailable. Try again later."
    );
}

#[tokio::test]
async fn test_unauthorized_operator() {
    init_test();

    let api = MockProvisioningApi::start().await;
    api.set_auth_reply(MockReply::json(401, json!({"id": "unauthorized"})));

    let err = provision_credentials(&provisioner_for(&api), TEST_ADDON, AccessMode::ReadOnly)
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::NotLoggedIn));
    assert!(api.requests_to("POST", "/adhoc-ssh-users").is_empty());
    assert_eq!(api.revocation_count(), 0);
}

#[tokio::test]
async fn test_token_without_access_token_is_revoked() {
    init_test();

    let api = MockProvisioningApi::start().await;
    api.set_auth_reply(MockReply::json(201, json!({"id": FAKE_AUTH_ID})));

    let err = provision_credentials(&provisioner_for(&api), TEST_ADDON, AccessMode::ReadOnly)
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::NotLoggedIn));
    assert!(api.requests_to("POST", "/adhoc-ssh-users").is_empty());
    assert_eq!(api.revocation_count(), 1);
}

#[tokio::test]
async fn test_failed_revocation_does_not_mask_result() {
    init_test();

    let api = MockProvisioningApi::start().await;
    api.set_revoke_reply(MockReply::json(500, json!({"id": "server_error"})));

    let creds = provision_credentials(&provisioner_for(&api), TEST_ADDON, AccessMode::ReadOnly)
        .await
        .unwrap();
    assert_eq!(creds.ssh.host, FAKE_SSH_HOST);
    assert_eq!(api.revocation_count(), 1);

    // A fetch error still wins over a revocation error
    let api = MockProvisioningApi::start().await;
    api.set_revoke_reply(MockReply::json(500, json!({"id": "server_error"})));
    api.set_ssh_reply(MockReply::json(422, json!({"reason": "Not ready"})));

    let err = provision_credentials(&provisioner_for(&api), TEST_ADDON, AccessMode::ReadOnly)
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::NotReady { .. }));
    assert_eq!(api.revocation_count(), 1);
}
