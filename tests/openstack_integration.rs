//! Integration tests for the OpenStack compute client using wiremock

use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nova_servertester::TesterError;
use nova_servertester::compute::openstack::NovaClient;
use nova_servertester::compute::{ComputeApi, CreateServerRequest, Nics};

fn client(server: &MockServer) -> NovaClient {
    NovaClient::new(
        "test-token",
        &format!("{}/v2.1/", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn request(nics: Nics) -> CreateServerRequest {
    CreateServerRequest {
        name: "test-server-ProvisioningTest-1".to_string(),
        image_id: "img-1".to_string(),
        flavor_id: "1".to_string(),
        nics,
        userdata: Some("hello".to_string()),
        metadata: BTreeMap::from([("SimpleTestStatus".to_string(), "pending".to_string())]),
        availability_zone: Some("az1".to_string()),
    }
}

/// Test image lookup through the compute image proxy
#[tokio::test]
async fn test_find_image_compute_proxy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.1/images/img-1"))
        .and(header("X-Auth-Token", "test-token"))
        .and(header("User-Agent", "nova-servertester"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"image": {"id": "img-1", "name": "cirros"}})),
        )
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let image = client.find_image("img-1").await.unwrap();
    assert_eq!(image.id, "img-1");
    assert_eq!(image.name, "cirros");

    let err = client.find_image("missing").await.unwrap_err();
    assert!(matches!(err, TesterError::NotFound { .. }));
}

/// Test Glance lookup falling back from id to name
#[tokio::test]
async fn test_find_image_glance_by_name() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/images"))
        .and(query_param("name", "cirros"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{"id": "0b7c4a1e", "name": "cirros", "status": "active"}]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/images"))
        .and(query_param("name", "fedora"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"images": []})))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server).with_image_endpoint(&mock_server.uri());

    // GET /v2/images/cirros is not mounted and answers 404
    let image = client.find_image("cirros").await.unwrap();
    assert_eq!(image.id, "0b7c4a1e");

    let err = client.find_image("fedora").await.unwrap_err();
    assert!(matches!(err, TesterError::NotFound { ref kind, .. } if kind == "Image"));
}

/// Test Glance lookup by id
#[tokio::test]
async fn test_find_image_glance_by_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/images/0b7c4a1e"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "0b7c4a1e", "name": "cirros"})),
        )
        .mount(&mock_server)
        .await;

    let client = client(&mock_server).with_image_endpoint(&mock_server.uri());
    let image = client.find_image("0b7c4a1e").await.unwrap();
    assert_eq!(image.name, "cirros");
}

/// Test network lookup through Neutron and through the compute proxy
#[tokio::test]
async fn test_find_network() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.0/networks"))
        .and(query_param("name", "private"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "networks": [{"id": "net-1", "name": "private"}]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2.1/os-networks/net-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "network": {"id": "net-2", "label": "legacy"}
        })))
        .mount(&mock_server)
        .await;

    let neutron = client(&mock_server).with_network_endpoint(&mock_server.uri());
    let network = neutron.find_network("private").await.unwrap();
    assert_eq!(network.id, "net-1");

    let proxy = client(&mock_server);
    let network = proxy.find_network("net-2").await.unwrap();
    assert_eq!(network.id, "net-2");
    assert_eq!(network.name, "legacy");
}

/// Test flavor lookup by name, then by id
#[tokio::test]
async fn test_find_flavor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.1/flavors/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "flavors": [
                {"id": "1", "name": "m1.tiny", "ram": 512},
                {"id": "2", "name": "1", "ram": 2048}
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    assert_eq!(client.find_flavor("m1.tiny").await.unwrap().id, "1");
    // a name match wins over an id match
    assert_eq!(client.find_flavor("1").await.unwrap().id, "2");
    assert!(matches!(
        client.find_flavor("m1.huge").await,
        Err(TesterError::NotFound { .. })
    ));
}

/// Test server creation request body
#[tokio::test]
async fn test_create_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/servers"))
        .and(header("X-Auth-Token", "test-token"))
        .and(body_partial_json(json!({
            "server": {
                "name": "test-server-ProvisioningTest-1",
                "imageRef": "img-1",
                "flavorRef": "1",
                "user_data": "aGVsbG8=",
                "availability_zone": "az1",
                "metadata": {"SimpleTestStatus": "pending"},
                "networks": [{"uuid": "net-1"}]
            }
        })))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({"server": {"id": "srv-1"}})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let server = client
        .create_server(&request(Nics::Network("net-1".to_string())))
        .await
        .unwrap();
    assert_eq!(server.id, "srv-1");
    assert_eq!(server.name, "test-server-ProvisioningTest-1");
}

/// Test auto network allocation sends the microversion header
#[tokio::test]
async fn test_create_server_auto_network() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/servers"))
        .and(header("X-OpenStack-Nova-API-Version", "2.37"))
        .and(body_partial_json(json!({"server": {"networks": "auto"}})))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({"server": {"id": "srv-2"}})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let server = client.create_server(&request(Nics::Auto)).await.unwrap();
    assert_eq!(server.id, "srv-2");
}

/// Test API errors carry status and body
#[tokio::test]
async fn test_create_server_quota_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/servers"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Quota exceeded"))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let err = client.create_server(&request(Nics::Unspecified)).await.unwrap_err();
    match err {
        TesterError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Quota exceeded");
        }
        other => panic!("unexpected error: {}", other),
    }
}

/// Test server polling returns status and metadata
#[tokio::test]
async fn test_get_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2.1/servers/srv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "server": {
                "id": "srv-1",
                "name": "test-server-ProvisioningTest-1",
                "status": "ACTIVE",
                "metadata": {"SimpleTestStatus": "error", "SimpleTestExitStatus": "2"},
                "addresses": {}
            }
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let server = client.get_server("srv-1").await.unwrap();
    assert!(server.is_active());
    assert_eq!(server.meta("SimpleTestStatus"), Some("error"));
    assert_eq!(server.meta("SimpleTestExitStatus"), Some("2"));

    let err = client.get_server("srv-9").await.unwrap_err();
    assert!(matches!(err, TesterError::NotFound { ref kind, .. } if kind == "Server"));
}

/// Test deletion tolerates servers that are already gone
#[tokio::test]
async fn test_delete_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v2.1/servers/srv-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v2.1/servers/srv-3"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    assert!(client.delete_server("srv-1").await.is_ok());
    assert!(client.delete_server("srv-2").await.is_ok());
    assert!(matches!(
        client.delete_server("srv-3").await,
        Err(TesterError::Api { status: 500, .. })
    ));
}

/// Test console output retrieval
#[tokio::test]
async fn test_get_console_output() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2.1/servers/srv-1/action"))
        .and(body_json(json!({"os-getConsoleOutput": {}})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"output": "login: \n"})),
        )
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    assert_eq!(client.get_console_output("srv-1").await.unwrap(), "login: \n");
}
