use std::{sync::Arc, thread};

use anyhow::{Context, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigurationFile, TransportEncoding};

const CSRF_HEADER_NAME: &str = "X-CSRFToken";

// identifies one request so that its response can be matched back up
pub type Ticket = u64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReference {
    pub code: String,
    pub date: String,
    pub status: String,
}

// The body the conversation endpoint replies with. Every field is optional and
// `null` counts as missing, but a field of the wrong type fails the whole response.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ConversationResponse {
    pub reply: Option<String>,
    pub quick_actions: Option<Vec<String>>,
    pub orders: Option<Vec<OrderReference>>,

    // the intent the server matched; informational only
    pub intent: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAction {
    TrackOrder,
}

// A single turn posted to the endpoint: either free text or a structured action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TurnBody {
    Message {
        message: String,
    },
    Action {
        action: TurnAction,
        order_code: String,
    },
}
impl TurnBody {
    pub fn message(text: &str) -> Self {
        TurnBody::Message {
            message: text.to_owned(),
        }
    }

    pub fn track_order(order_code: &str) -> Self {
        TurnBody::Action {
            action: TurnAction::TrackOrder,
            order_code: order_code.to_owned(),
        }
    }

    // the key/value pairs used when the turn is sent form encoded
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            TurnBody::Message { message } => vec![("message", message.clone())],
            TurnBody::Action { action, order_code } => {
                let action_name = match action {
                    TurnAction::TrackOrder => "track_order",
                };
                vec![
                    ("action", action_name.to_owned()),
                    ("order_code", order_code.clone()),
                ]
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected status code: {0}")]
    Status(reqwest::StatusCode),

    #[error("response failed validation: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("the conversation endpoint worker is no longer running")]
    Disconnected,
}

// Parses the raw body of an endpoint response.
pub fn parse_conversation_response(body: &str) -> Result<ConversationResponse, EndpointError> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    // a bare array would otherwise be accepted positionally by the struct decoder
    if !value.is_object() {
        return Err(EndpointError::Schema(serde::de::Error::custom(
            "expected a JSON object",
        )));
    }
    Ok(serde_json::from_value(value)?)
}

// Pulls the `csrftoken` value out of a `Cookie` header string.
pub fn csrf_token_from_cookie_header(cookie_header: &str) -> Option<String> {
    static CSRF_COOKIE_REGEX: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?:^|;)\s*csrftoken=([^;]*)")
            .context("Compiling csrf cookie regex.")
            .unwrap()
    });

    CSRF_COOKIE_REGEX
        .captures(cookie_header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_owned())
        .filter(|token| !token.is_empty())
}

// The seam between the endpoint worker and whatever actually moves the bytes.
pub trait ConversationTransport: Send {
    fn fetch_greeting(&mut self) -> Result<ConversationResponse, EndpointError>;
    fn post_turn(&mut self, body: &TurnBody) -> Result<ConversationResponse, EndpointError>;
}

// Talks to the storefront's conversation endpoint over HTTP.
pub struct HttpConversationClient {
    client: reqwest::blocking::Client,
    url: Url,
    jar: Arc<Jar>,
    encoding: TransportEncoding,
}
impl HttpConversationClient {
    pub fn new(config: &ConfigurationFile) -> Result<Self> {
        let url = Url::parse(&config.conversation_url())
            .with_context(|| format!("Parsing endpoint url '{}'", config.conversation_url()))?;

        // the jar keeps the server's session cookie and hands us the csrf cookie
        let jar = Arc::new(Jar::default());
        if let Some(cookie_str) = &config.session_cookie {
            for cookie in cookie_str.split(';').map(str::trim).filter(|c| !c.is_empty()) {
                jar.add_cookie_str(cookie, &url);
            }
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .cookie_provider(jar.clone())
            .build()
            .context("Failed to create the blocking reqwest client for the conversation endpoint.")?;

        Ok(Self {
            client,
            url,
            jar,
            encoding: config.encoding(),
        })
    }

    fn csrf_token(&self) -> Option<String> {
        let cookies = self.jar.cookies(&self.url)?;
        let cookies = cookies.to_str().ok()?;
        csrf_token_from_cookie_header(cookies)
    }

    fn decode(
        resp: reqwest::blocking::Response,
    ) -> Result<ConversationResponse, EndpointError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(EndpointError::Status(status));
        }
        let text = resp.text()?;
        log::trace!("conversation endpoint responded with: {}", text);
        parse_conversation_response(&text)
    }
}
impl ConversationTransport for HttpConversationClient {
    fn fetch_greeting(&mut self) -> Result<ConversationResponse, EndpointError> {
        let resp = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;
        Self::decode(resp)
    }

    fn post_turn(&mut self, body: &TurnBody) -> Result<ConversationResponse, EndpointError> {
        let request = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::ACCEPT, "application/json");

        let request = match self.encoding {
            TransportEncoding::Json => request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_string(body)?),
            TransportEncoding::Form => {
                let request = request.form(&body.form_fields());
                match self.csrf_token() {
                    Some(token) => request.header(CSRF_HEADER_NAME, token),
                    None => {
                        log::warn!("No csrftoken cookie available; posting the form without {CSRF_HEADER_NAME}");
                        request
                    }
                }
            }
        };

        Self::decode(request.send()?)
    }
}

pub enum EndpointRequest {
    Greeting(Ticket),
    Turn(Ticket, TurnBody),
    ImmediateShutdown,
}

pub enum EndpointResponse {
    Settled {
        ticket: Ticket,
        result: Result<ConversationResponse, EndpointError>,
    },
}

// The worker thread that performs the endpoint calls so the UI never waits on the network.
pub struct ConversationEndpoint {
    pub send_to_server: Sender<EndpointRequest>,
    pub recv_on_client: Receiver<EndpointResponse>,
    pub handle: thread::JoinHandle<()>,
}
impl ConversationEndpoint {
    pub fn spawn<T: ConversationTransport + 'static>(mut transport: T) -> ConversationEndpoint {
        let (send_to_server, recv_on_server) = bounded::<EndpointRequest>(10);
        let (send_to_client, recv_on_client) = bounded::<EndpointResponse>(10);
        let thread_handle = thread::spawn(move || loop {
            // BLOCK UNTIL NEW REQUEST
            let request = match recv_on_server.recv() {
                Ok(r) => r,
                Err(_) => {
                    log::debug!("All endpoint request senders dropped; stopping the worker.");
                    return;
                }
            };

            let (ticket, result) = match request {
                EndpointRequest::ImmediateShutdown => {
                    return;
                }
                EndpointRequest::Greeting(ticket) => (ticket, transport.fetch_greeting()),
                EndpointRequest::Turn(ticket, body) => (ticket, transport.post_turn(&body)),
            };
            if let Err(err) = &result {
                log::warn!("Conversation endpoint request {} failed: {}", ticket, err);
            }

            // SEND THE RESULT FROM THE SERVER
            if let Err(err) = send_to_client.send(EndpointResponse::Settled { ticket, result }) {
                log::error!("Endpoint worker thread's send failed: {}", err);
            }
            log::trace!("One job-cycle complete in the endpoint worker thread.");
        });

        ConversationEndpoint {
            send_to_server,
            recv_on_client,
            handle: thread_handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn parses_full_turn_response() {
        let resp = parse_conversation_response(
            r#"{"reply":"Ongkir Rp10.000","quick_actions":["Lacak pesanan"],
                "orders":[{"code":"A1","date":"2024-01-01","status":"shipped"}],
                "intent":"pengiriman"}"#,
        )
        .unwrap();
        assert_eq!(
            resp,
            ConversationResponse {
                reply: Some("Ongkir Rp10.000".to_owned()),
                quick_actions: Some(vec!["Lacak pesanan".to_owned()]),
                orders: Some(vec![OrderReference {
                    code: "A1".to_owned(),
                    date: "2024-01-01".to_owned(),
                    status: "shipped".to_owned(),
                }]),
                intent: Some("pengiriman".to_owned()),
            }
        );
    }

    #[test]
    fn missing_and_null_fields_are_absent() {
        let resp = parse_conversation_response(r#"{"orders":null}"#).unwrap();
        assert_eq!(resp, ConversationResponse::default());
    }

    #[test]
    fn wrong_shapes_fail_validation() {
        for body in [
            r#"{"orders":"none"}"#,
            r#"{"quick_actions":[1,2]}"#,
            r#"{"reply":42}"#,
            r#"["Halo!"]"#,
            "<html>oops</html>",
        ] {
            let res = parse_conversation_response(body);
            assert!(
                matches!(res, Err(EndpointError::Schema(_))),
                "accepted {body}"
            );
        }
    }

    #[test]
    fn turn_bodies_serialize_to_the_endpoint_shapes() {
        assert_eq!(
            serde_json::to_value(TurnBody::message("Cek ongkir")).unwrap(),
            serde_json::json!({"message": "Cek ongkir"})
        );
        assert_eq!(
            serde_json::to_value(TurnBody::track_order("ORD-7")).unwrap(),
            serde_json::json!({"action": "track_order", "order_code": "ORD-7"})
        );
        assert_eq!(
            TurnBody::track_order("ORD-7").form_fields(),
            vec![
                ("action", "track_order".to_owned()),
                ("order_code", "ORD-7".to_owned())
            ]
        );
    }

    #[test]
    fn csrf_token_is_found_among_cookies() {
        assert_eq!(
            csrf_token_from_cookie_header("sessionid=abc; csrftoken=tok123; theme=dark"),
            Some("tok123".to_owned())
        );
        assert_eq!(
            csrf_token_from_cookie_header("csrftoken=first"),
            Some("first".to_owned())
        );
        assert_eq!(csrf_token_from_cookie_header("xcsrftoken=nope"), None);
        assert_eq!(csrf_token_from_cookie_header("csrftoken="), None);
    }

    struct StubTransport {
        turns: Vec<TurnBody>,
    }
    impl ConversationTransport for StubTransport {
        fn fetch_greeting(&mut self) -> Result<ConversationResponse, EndpointError> {
            Ok(ConversationResponse {
                reply: Some("Halo!".to_owned()),
                ..Default::default()
            })
        }

        fn post_turn(&mut self, body: &TurnBody) -> Result<ConversationResponse, EndpointError> {
            self.turns.push(body.clone());
            if self.turns.len() > 1 {
                return Err(EndpointError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(ConversationResponse::default())
        }
    }

    #[test]
    fn worker_settles_requests_in_order() {
        let endpoint = ConversationEndpoint::spawn(StubTransport { turns: Vec::new() });
        endpoint.send_to_server.send(EndpointRequest::Greeting(1)).unwrap();
        endpoint
            .send_to_server
            .send(EndpointRequest::Turn(2, TurnBody::message("a")))
            .unwrap();
        endpoint
            .send_to_server
            .send(EndpointRequest::Turn(3, TurnBody::message("b")))
            .unwrap();

        let timeout = Duration::from_secs(5);
        let EndpointResponse::Settled { ticket, result } =
            endpoint.recv_on_client.recv_timeout(timeout).unwrap();
        assert_eq!(ticket, 1);
        assert_eq!(result.unwrap().reply.as_deref(), Some("Halo!"));

        let EndpointResponse::Settled { ticket, result } =
            endpoint.recv_on_client.recv_timeout(timeout).unwrap();
        assert_eq!(ticket, 2);
        assert!(result.is_ok());

        let EndpointResponse::Settled { ticket, result } =
            endpoint.recv_on_client.recv_timeout(timeout).unwrap();
        assert_eq!(ticket, 3);
        assert!(matches!(result, Err(EndpointError::Status(_))));

        endpoint
            .send_to_server
            .send(EndpointRequest::ImmediateShutdown)
            .unwrap();
        endpoint.handle.join().unwrap();
    }

    #[test]
    fn http_client_builds_from_config() {
        let config = ConfigurationFile {
            session_cookie: Some("sessionid=abc; csrftoken=tok".to_owned()),
            transport_encoding: Some(TransportEncoding::Form),
            ..Default::default()
        };
        let client = HttpConversationClient::new(&config).unwrap();
        assert_eq!(client.url.as_str(), "http://localhost:8000/chatbot/");
        assert_eq!(client.csrf_token(), Some("tok".to_owned()));
    }

    // serves exactly one request, then hands back the raw request text
    fn serve_once(
        status_line: &'static str,
        body: &'static str,
        delay: Duration,
    ) -> (String, thread::JoinHandle<String>) {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw: Vec<u8> = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            thread::sleep(delay);
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            // the client may already have given up
            let _ = stream.write_all(response.as_bytes());
            String::from_utf8_lossy(&raw).to_string()
        });
        (host, handle)
    }

    fn config_for(host: String) -> ConfigurationFile {
        ConfigurationFile {
            endpoint_url: Some(host),
            request_timeout_s: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn greeting_is_fetched_with_a_get() {
        let (host, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"reply":"Halo!","quick_actions":["Promo"]}"#,
            Duration::ZERO,
        );
        let mut client = HttpConversationClient::new(&config_for(host)).unwrap();
        let resp = client.fetch_greeting().unwrap();
        assert_eq!(resp.reply.as_deref(), Some("Halo!"));
        assert_eq!(resp.quick_actions, Some(vec!["Promo".to_owned()]));

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /chatbot/ HTTP/1.1"), "{request}");
    }

    #[test]
    fn json_turns_are_posted_as_json() {
        let (host, server) = serve_once("HTTP/1.1 200 OK", r#"{"reply":"ok"}"#, Duration::ZERO);
        let mut client = HttpConversationClient::new(&config_for(host)).unwrap();
        let resp = client.post_turn(&TurnBody::message("Cek ongkir")).unwrap();
        assert_eq!(resp.reply.as_deref(), Some("ok"));

        let request = server.join().unwrap();
        let lowered = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /chatbot/ HTTP/1.1"), "{request}");
        assert!(lowered.contains("content-type: application/json"), "{request}");
        assert!(!lowered.contains("x-csrftoken"), "{request}");
        assert!(request.ends_with(r#"{"message":"Cek ongkir"}"#), "{request}");
    }

    #[test]
    fn form_turns_carry_the_csrf_header() {
        let (host, server) = serve_once("HTTP/1.1 200 OK", r#"{"reply":"ok"}"#, Duration::ZERO);
        let config = ConfigurationFile {
            transport_encoding: Some(TransportEncoding::Form),
            session_cookie: Some("sessionid=abc; csrftoken=tok9".to_owned()),
            ..config_for(host)
        };
        let mut client = HttpConversationClient::new(&config).unwrap();
        client.post_turn(&TurnBody::track_order("ORD-7")).unwrap();

        let request = server.join().unwrap();
        let lowered = request.to_ascii_lowercase();
        assert!(lowered.contains("x-csrftoken: tok9"), "{request}");
        assert!(
            lowered.contains("content-type: application/x-www-form-urlencoded"),
            "{request}"
        );
        assert!(request.ends_with("action=track_order&order_code=ORD-7"), "{request}");
    }

    #[test]
    fn error_status_is_reported() {
        let (host, server) = serve_once(
            "HTTP/1.1 500 Internal Server Error",
            r#"{"reply":"should not be used"}"#,
            Duration::ZERO,
        );
        let mut client = HttpConversationClient::new(&config_for(host)).unwrap();
        let res = client.post_turn(&TurnBody::message("Halo"));
        match res {
            Err(EndpointError::Status(status)) => {
                assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR)
            }
            other => panic!("expected a status error, got {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn slow_endpoint_times_out() {
        let (host, _server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"reply":"terlambat"}"#,
            Duration::from_secs(3),
        );
        let mut client = HttpConversationClient::new(&config_for(host)).unwrap();
        match client.fetch_greeting() {
            Err(EndpointError::Network(err)) => assert!(err.is_timeout(), "{err}"),
            other => panic!("expected a timeout, got {other:?}"),
        }
    }
}
