//! Wire-level behavior of the reqwest adapter and the token endpoint call.

use assert_json_diff::assert_json_include;
use realmsync_keycloak::models::{ClientRepresentation, RealmRepresentation};
use realmsync_keycloak::{
    ConnectionParams, Credentials, HttpKeycloakClient, KeycloakApi, SessionToken,
    build_http_client, login,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> HttpKeycloakClient {
    let base = Url::parse(&server.uri()).unwrap();
    HttpKeycloakClient::new(reqwest::Client::new(), base, SessionToken::bearer("tkn"))
}

#[tokio::test]
async fn test_password_login_posts_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/realms/master/protocol/openid-connect/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=admin-cli"))
        .and(body_string_contains("username=admin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "abc",
            "refresh_token": "def",
            "expires_in": 60,
            "refresh_expires_in": 1800,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let conn = ConnectionParams::new(server.uri(), "master");
    let http = build_http_client(&conn).unwrap();
    let creds = Credentials::Password {
        username: "admin".to_string(),
        password: "pw".to_string(),
    };

    let token = login(&http, &conn, &creds).await.unwrap();
    assert_eq!(token.access_token, "abc");
    assert_eq!(token.refresh_token.as_deref(), Some("def"));
}

#[tokio::test]
async fn test_login_rejection_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_grant"})),
        )
        .mount(&server)
        .await;

    let conn = ConnectionParams::new(server.uri(), "master");
    let http = build_http_client(&conn).unwrap();
    let creds = Credentials::ClientCredentials {
        client_id: "robot".to_string(),
        client_secret: "nope".to_string(),
    };

    let err = login(&http, &conn, &creds).await.unwrap_err();
    assert_eq!(err.status_code(), Some(401));
}

#[tokio::test]
async fn test_missing_realm_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let realm = adapter(&server).get_realm("ghost").await.unwrap();
    assert!(realm.is_none());
}

#[tokio::test]
async fn test_requests_carry_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/team"))
        .and(header("authorization", "Bearer tkn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "realm": "team",
            "id": "r-1",
            "enabled": true,
            "unknownField": [1, 2, 3]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let realm = adapter(&server).get_realm("team").await.unwrap().unwrap();
    assert_eq!(realm.realm, "team");
    assert_eq!(realm.id.as_deref(), Some("r-1"));
}

#[tokio::test]
async fn test_create_client_returns_location_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/realms/team/clients"))
        .respond_with(ResponseTemplate::new(201).insert_header(
            "Location",
            format!("{}/admin/realms/team/clients/c-42", server.uri()).as_str(),
        ))
        .mount(&server)
        .await;

    let client = ClientRepresentation {
        client_id: "portal".to_string(),
        enabled: true,
        ..Default::default()
    };
    let id = adapter(&server).create_client("team", &client).await.unwrap();
    assert_eq!(id, "c-42");

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_json_include!(actual: body, expected: json!({"clientId": "portal", "enabled": true}));
}

#[tokio::test]
async fn test_duplicate_create_is_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/realms"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({"errorMessage": "Conflict detected. See logs for details"})),
        )
        .mount(&server)
        .await;

    let err = adapter(&server)
        .create_realm(&RealmRepresentation::new("team"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(err.to_string().contains("Conflict detected"));
}

#[tokio::test]
async fn test_gateway_errors_are_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = adapter(&server).get_realm("team").await.unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_find_client_by_client_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/team/clients"))
        .and(query_param("clientId", "portal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "c-1", "clientId": "portal", "enabled": true}
        ])))
        .mount(&server)
        .await;

    let client = adapter(&server)
        .get_client("team", "portal")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(client.id.as_deref(), Some("c-1"));
}

#[tokio::test]
async fn test_default_idp_creates_redirector_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/team/authentication/flows/browser/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "ex-1", "providerId": "auth-cookie"},
            {"id": "ex-2", "providerId": "identity-provider-redirector"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/realms/team/authentication/executions/ex-2/config"))
        .and(body_json(json!({
            "alias": "default-idp",
            "config": {"defaultProvider": "corp"}
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server)
        .set_default_identity_provider("team", "corp")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_default_idp_reads_existing_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/team/authentication/flows/browser/executions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "ex-2", "providerId": "identity-provider-redirector", "authenticationConfig": "cfg-1"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/team/authentication/config/cfg-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cfg-1",
            "alias": "default-idp",
            "config": {"defaultProvider": "corp"}
        })))
        .mount(&server)
        .await;

    let alias = adapter(&server)
        .get_default_identity_provider("team")
        .await
        .unwrap();
    assert_eq!(alias.as_deref(), Some("corp"));
}
