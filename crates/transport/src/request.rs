//! Wire format of the hop between the storefront and the local relay.
//!
//! The body is `application/x-www-form-urlencoded` with the fields
//! `sequence_no`, `data`, `is_local_request`, `correlation_id` and
//! `send_key`. The relay also accepts `event_no` for the sequence field.

use url::form_urlencoded;

use crate::target::TransportConfig;

/// Outbound relay request for one event.
#[derive(Debug, Clone, Copy)]
pub struct RelayRequest<'a> {
    pub data: &'a str,
    pub sequence_no: u64,
    pub correlation_id: &'a str,
    pub send_key: &'a str,
}

impl RelayRequest<'_> {
    pub fn form_body(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("sequence_no", &self.sequence_no.to_string())
            .append_pair("data", self.data)
            .append_pair("is_local_request", "1")
            .append_pair("correlation_id", self.correlation_id)
            .append_pair("send_key", self.send_key)
            .finish()
    }

    /// Complete HTTP/1.1 request text for writing straight to a socket.
    pub fn http_frame(&self, target: &TransportConfig) -> String {
        let body = self.form_body();
        let mut frame = String::with_capacity(body.len() + 256);
        frame.push_str(&format!("POST {} HTTP/1.1\r\n", target.path));
        frame.push_str(&format!("Host: {}\r\n", target.host_header()));
        frame.push_str("Content-Type: application/x-www-form-urlencoded\r\n");
        frame.push_str(&format!("Content-Length: {}\r\n", body.len()));
        frame.push_str("\r\n");
        frame.push_str(&body);
        frame.push_str("\r\n\r\n");
        frame
    }
}

/// Inbound relay request as parsed by the relay endpoint. Every field is
/// optional so malformed requests can still be answered uniformly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayForm {
    pub sequence_no: Option<u64>,
    pub data: Option<String>,
    pub is_local_request: bool,
    pub correlation_id: Option<String>,
    pub send_key: Option<String>,
}

impl RelayForm {
    pub fn parse(body: &[u8]) -> Self {
        let mut form = RelayForm::default();
        for (key, value) in form_urlencoded::parse(body) {
            match key.as_ref() {
                "sequence_no" | "event_no" => form.sequence_no = value.trim().parse().ok(),
                "data" => form.data = Some(value.into_owned()),
                "is_local_request" => form.is_local_request = is_truthy(&value),
                "correlation_id" => form.correlation_id = Some(value.into_owned()),
                "send_key" => form.send_key = Some(value.into_owned()),
                _ => {}
            }
        }
        form
    }
}

/// Flag semantics of the form: empty and "0" are false, anything else true.
fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TransportConfig {
        TransportConfig {
            scheme: "http".into(),
            host: "shop.local".into(),
            port: 80,
            path: "/bizevent/send".into(),
            send_key: "987654".into(),
        }
    }

    #[test]
    fn test_form_body_round_trips_through_parser() {
        let data = r#"{"eventType":"checkout & pay","x":"a=b"}"#;
        let request = RelayRequest {
            data,
            sequence_no: 12,
            correlation_id: "555",
            send_key: "987654",
        };
        let form = RelayForm::parse(request.form_body().as_bytes());
        assert_eq!(form.sequence_no, Some(12));
        assert_eq!(form.data.as_deref(), Some(data));
        assert!(form.is_local_request);
        assert_eq!(form.correlation_id.as_deref(), Some("555"));
        assert_eq!(form.send_key.as_deref(), Some("987654"));
    }

    #[test]
    fn test_http_frame_layout() {
        let request = RelayRequest {
            data: "{}",
            sequence_no: 0,
            correlation_id: "1",
            send_key: "987654",
        };
        let body = request.form_body();
        let frame = request.http_frame(&target());

        assert!(frame.starts_with("POST /bizevent/send HTTP/1.1\r\nHost: shop.local\r\n"));
        assert!(frame.contains("Content-Type: application/x-www-form-urlencoded\r\n"));
        assert!(frame.contains(&format!("Content-Length: {}\r\n\r\n", body.len())));
        assert!(frame.ends_with(&format!("{body}\r\n\r\n")));
    }

    #[test]
    fn test_parse_accepts_event_no_and_flag_variants() {
        let form = RelayForm::parse(b"event_no=7&is_local_request=0&data=x");
        assert_eq!(form.sequence_no, Some(7));
        assert!(!form.is_local_request);
        assert!(form.send_key.is_none());

        let form = RelayForm::parse(b"is_local_request=true");
        assert!(form.is_local_request);
        assert!(!RelayForm::parse(b"is_local_request=").is_local_request);
    }
}
