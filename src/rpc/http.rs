//! [NetworkAdapter] over plain HTTP.

use reqwest::blocking::Client;
use tracing::trace;

use super::NetworkAdapter;
use crate::common::{Contact, RequestSpecific, RequestTypeSpecific, ResponseSpecific};
use crate::{Config, Result};

/// Sends each RPC as an HTTP request to `http://{ip}:{port}{path}`.
///
/// Requests are form encoded, responses JSON, and every request is bounded by
/// [Config::request_timeout].
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    client: Client,
}

impl HttpAdapter {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self { client })
    }

    fn url(recipient: &Contact, request: &RequestSpecific) -> String {
        format!("http://{}{}", recipient.address(), request.path())
    }
}

impl NetworkAdapter for HttpAdapter {
    fn request(&self, recipient: &Contact, request: RequestSpecific) -> Result<ResponseSpecific> {
        let url = Self::url(recipient, &request);

        trace!(%url, ?request.request_type, "Sending request");

        let response = match request.request_type {
            RequestTypeSpecific::Info => self.client.get(&url).send()?,
            _ => self.client.post(&url).form(&request.to_form()).send()?,
        };

        let status = response.status().as_u16();
        let body = response.text()?;

        ResponseSpecific::from_http(&request.request_type, status, &body)
    }
}

#[cfg(test)]
mod test {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::common::Id;

    /// Answer a single HTTP request with `status` and `body`, returning the request line.
    fn serve_once(status: u16, body: &'static str) -> (u16, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();

            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }

            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();

            request_line
        });

        (port, handle)
    }

    fn adapter() -> HttpAdapter {
        HttpAdapter::new(&Config::default().with_request_timeout(Duration::from_secs(2))).unwrap()
    }

    fn sender() -> Contact {
        Contact::new(Id::from(1), "127.0.0.1", 9)
    }

    #[test]
    fn ping_over_http() {
        let (port, server) = serve_once(200, "true");
        let recipient = Contact::new(Id::from(2), "127.0.0.1", port);

        assert!(adapter().ping(&recipient, &sender()));
        assert!(server.join().unwrap().starts_with("POST /rpc/ping "));
    }

    #[test]
    fn find_node_over_http() {
        let (port, server) = serve_once(
            200,
            r#"[{"id":"0000000000000000000000000000000000000003","ip":"10.0.0.3","port":3000}]"#,
        );
        let recipient = Contact::new(Id::from(2), "127.0.0.1", port);

        let contacts = adapter().find_node(Id::from(3), &recipient, &sender()).unwrap();

        assert_eq!(contacts, vec![Contact::new(Id::from(3), "10.0.0.3", 3000)]);
        assert_eq!(contacts[0].address(), "10.0.0.3:3000");
        assert!(server.join().unwrap().starts_with("POST /rpc/find_node "));
    }

    #[test]
    fn error_status_is_no_response() {
        let (port, server) = serve_once(500, "{}");
        let recipient = Contact::new(Id::from(2), "127.0.0.1", port);

        assert!(adapter().find_node(Id::from(3), &recipient, &sender()).is_none());
        server.join().unwrap();
    }

    #[test]
    fn unreachable_is_no_response() {
        // Bind then drop, so nothing listens on this port.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let recipient = Contact::new(Id::from(2), "127.0.0.1", port);

        assert!(!adapter().ping(&recipient, &sender()));
    }
}
