//! Tests for the Compute Engine adapter against a canned local HTTP server.

use std::sync::mpsc::{self, Receiver};

use rstest::rstest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::*;
use crate::config::DEFAULT_API_BASE;

fn connection(api_base: &str) -> ConnectionConfig {
    ConnectionConfig {
        project_id: String::from("proj"),
        access_token: String::from("secret-token"),
        api_base: api_base.to_owned(),
    }
}

/// Answers one connection with a canned response and returns the request head.
async fn answer(mut socket: TcpStream, status: &str, body: &str) -> String {
    let mut head = Vec::new();
    let mut buf = [0_u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = socket
            .read(&mut buf)
            .await
            .unwrap_or_else(|err| panic!("read request: {err}"));
        if read == 0 {
            break;
        }
        head.extend(buf.iter().take(read));
    }
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    socket
        .write_all(response.as_bytes())
        .await
        .unwrap_or_else(|err| panic!("write response: {err}"));
    String::from_utf8_lossy(&head).into_owned()
}

/// Serves the canned responses in order, one per connection, reporting each
/// request head as it is answered.
async fn serve_sequence(
    responses: Vec<(&'static str, &'static str)>,
) -> (String, JoinHandle<()>, Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|err| panic!("bind listener: {err}"));
    let addr = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("listener address: {err}"));
    let (heads, received) = mpsc::channel();
    let handle = tokio::spawn(async move {
        for (status, body) in responses {
            let (socket, _) = listener
                .accept()
                .await
                .unwrap_or_else(|err| panic!("accept: {err}"));
            let head = answer(socket, status, body).await;
            heads
                .send(head)
                .unwrap_or_else(|err| panic!("record request head: {err}"));
        }
    });
    (format!("http://{addr}/compute/v1"), handle, received)
}

/// Serves one canned response and hands back the raw request head.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let (base, server, received) = serve_sequence(vec![(status, body)]).await;
    let handle = tokio::spawn(async move {
        server
            .await
            .unwrap_or_else(|err| panic!("server task: {err}"));
        received
            .try_recv()
            .unwrap_or_else(|err| panic!("no request was served: {err}"))
    });
    (base, handle)
}

async fn request_head(handle: JoinHandle<String>) -> String {
    handle
        .await
        .unwrap_or_else(|err| panic!("server task: {err}"))
}

#[rstest]
#[case::zonal(
    GoogleCompute::new(&connection(DEFAULT_API_BASE), "proj").zonal("us-central1-f", "instances/vm"),
    "https://compute.googleapis.com/compute/v1/projects/proj/zones/us-central1-f/instances/vm"
)]
#[case::global_in_other_project(
    GoogleCompute::new(&connection(DEFAULT_API_BASE), "proj").global("debian-cloud", "images/family/debian-12"),
    "https://compute.googleapis.com/compute/v1/projects/debian-cloud/global/images/family/debian-12"
)]
#[case::regional_with_trailing_slash(
    GoogleCompute::new(&connection("https://example.test/v1/"), "proj").regional("us-central1", "addresses"),
    "https://example.test/v1/projects/proj/regions/us-central1/addresses"
)]
fn resource_urls_are_scoped_to_the_project(#[case] url: String, #[case] expected: &str) {
    assert_eq!(url, expected);
}

#[tokio::test]
async fn get_instance_sends_bearer_token_and_normalises_status() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"name":"vm","zone":"https://x/zones/us-central1-f","status":"TERMINATED"}"#,
    )
    .await;
    let compute = GoogleCompute::new(&connection(&base), "proj");

    let instance = compute
        .get_instance("vm", "us-central1-f")
        .await
        .unwrap_or_else(|err| panic!("get_instance: {err}"));

    assert_eq!(instance.status, "STOPPED");
    assert_eq!(instance.zone, "us-central1-f");
    let head = request_head(server).await.to_lowercase();
    assert!(head.starts_with("get /compute/v1/projects/proj/zones/us-central1-f/instances/vm "));
    assert!(head.contains("authorization: bearer secret-token"));
}

#[tokio::test]
async fn missing_resource_maps_to_not_found() {
    let (base, server) = serve_once(
        "404 Not Found",
        r#"{"error":{"message":"The resource 'vm' was not found"}}"#,
    )
    .await;
    let compute = GoogleCompute::new(&connection(&base), "proj");

    let result = compute.get_instance("vm", "us-central1-f").await;

    assert_eq!(
        result.map(|instance| instance.name),
        Err(ComputeError::NotFound {
            resource: ResourceKind::Instance,
            name: String::from("vm"),
        })
    );
    request_head(server).await;
}

#[tokio::test]
async fn server_errors_carry_status_and_message() {
    let (base, server) = serve_once(
        "403 Forbidden",
        r#"{"error":{"message":"Required 'compute.instances.get' permission"}}"#,
    )
    .await;
    let compute = GoogleCompute::new(&connection(&base), "proj");

    let result = compute.get_disk("data", "us-central1-f").await;

    let message = match result {
        Err(ComputeError::Api { message }) => message,
        other => panic!("expected an API error, got {other:?}"),
    };
    assert!(message.starts_with("HTTP 403"), "{message}");
    assert!(message.contains("compute.instances.get"), "{message}");
    request_head(server).await;
}

#[tokio::test]
async fn stop_returns_the_pending_operation() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"name":"op-1","zone":"https://x/zones/us-central1-f","status":"RUNNING"}"#,
    )
    .await;
    let compute = GoogleCompute::new(&connection(&base), "proj");

    let operation = compute
        .stop_instance("vm", "us-central1-f")
        .await
        .unwrap_or_else(|err| panic!("stop_instance: {err}"));

    assert_eq!(operation.name, "op-1");
    assert!(!operation.is_done());
    let head = request_head(server).await.to_lowercase();
    assert!(head.starts_with("post /compute/v1/projects/proj/zones/us-central1-f/instances/vm/stop "));
}

#[tokio::test]
async fn accepted_insert_returns_the_instance_without_reading_it_back() {
    let (base, server, received) = serve_sequence(vec![
        (
            "200 OK",
            r#"{"name":"op-insert","zone":"https://x/zones/us-central1-f","status":"PENDING"}"#,
        ),
        (
            "404 Not Found",
            r#"{"error":{"message":"The resource 'vm' was not found"}}"#,
        ),
    ])
    .await;
    let compute = GoogleCompute::new(&connection(&base), "proj");
    let spec = InstanceSpec {
        name: String::from("vm"),
        zone: String::from("us-central1-f"),
        ..InstanceSpec::default()
    };

    let instance = compute
        .create_instance(&spec)
        .await
        .unwrap_or_else(|err| panic!("create_instance: {err}"));
    server.abort();

    assert_eq!(instance.name, "vm");
    assert_eq!(instance.zone, "us-central1-f");
    assert_eq!(instance.status, STATUS_PROVISIONING);
    assert!(!instance.is_ready());
    let heads: Vec<String> = received.try_iter().collect();
    assert_eq!(heads.len(), 1, "{heads:?}");
    assert!(
        heads
            .iter()
            .all(|head| head.to_lowercase().starts_with("post /compute/v1/projects/proj/zones/us-central1-f/instances ")),
        "{heads:?}"
    );
}

#[tokio::test]
async fn address_lookup_by_ip_uses_a_filter() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"items":[{"name":"static-ip","address":"203.0.113.7","status":"RESERVED"}]}"#,
    )
    .await;
    let compute = GoogleCompute::new(&connection(&base), "proj");

    let address = compute
        .get_address("203.0.113.7", "us-central1")
        .await
        .unwrap_or_else(|err| panic!("get_address: {err}"));

    assert_eq!(address.name, "static-ip");
    let head = request_head(server).await;
    assert!(head.contains("/regions/us-central1/addresses?filter="), "{head}");
}

#[rstest]
#[case::project("", "token", "GOOGLE_PROJECT_ID")]
#[case::token("proj", "", "GOOGLE_ACCESS_TOKEN")]
fn connector_rejects_missing_credentials(
    #[case] project_id: &str,
    #[case] access_token: &str,
    #[case] env_var: &str,
) {
    let connector = GoogleConnector::new(ConnectionConfig {
        project_id: project_id.to_owned(),
        access_token: access_token.to_owned(),
        api_base: DEFAULT_API_BASE.to_owned(),
    });
    let zone = crate::test_support::Harness::new().zone_config();

    let Err(ComputeError::Api { message }) = connector.connect(&zone) else {
        panic!("expected credentials to be rejected");
    };
    assert!(message.contains(env_var), "{message}");
}
