use crate::error::{Result, SnooError};
use serde_json::Value;
use tracing::debug;

/// The vendor app's user agent; the API expects it
pub const USER_AGENT: &str = "SNOO/351 CFNetwork/1121.2 Darwin/19.2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A fully built request, ready for the wire
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    #[cfg(test)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and raw body of any HTTP response, success or not
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Trait for the HTTP wire to allow mocking
pub trait Transport {
    /// Send the request. `Err` only when no response was received.
    fn execute(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, String>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, String> {
        let mut req = self.agent.request(request.method.as_str(), &request.url);
        for (name, value) in &request.headers {
            req = req.set(name, value);
        }
        for (name, value) in &request.query {
            req = req.query(name, value);
        }

        let resp = match &request.body {
            Some(body) => req.send_json(body),
            None => req.call(),
        };

        match resp {
            Ok(r) => {
                let status = r.status();
                let body = r.into_string().map_err(|e| e.to_string())?;
                Ok(HttpResponse { status, body })
            }
            Err(ureq::Error::Status(status, r)) => {
                let body = r.into_string().unwrap_or_default();
                Ok(HttpResponse { status, body })
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Issues requests against the vendor API and turns failures into `SnooError`s
pub struct Gateway<T: Transport> {
    base_url: String,
    transport: T,
}

impl<T: Transport> Gateway<T> {
    pub fn new(base_url: &str, transport: T) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Perform one request. The bearer token, when given, is sent as
    /// `Authorization: Bearer <token>`. Non-2xx responses are never retried.
    pub fn request(
        &self,
        endpoint: &str,
        payload: Option<&Value>,
        params: &[(&str, String)],
        method: Method,
        bearer: Option<&str>,
    ) -> Result<Value> {
        let mut headers = vec![("User-Agent".to_string(), USER_AGENT.to_string())];
        if let Some(token) = bearer {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        let request = HttpRequest {
            method,
            url: format!("{}{}", self.base_url, endpoint),
            headers,
            query: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            body: payload.cloned(),
        };

        debug!(method = method.as_str(), endpoint, "api request");
        let response = self
            .transport
            .execute(&request)
            .map_err(|message| SnooError::Transport {
                endpoint: endpoint.to_string(),
                message,
            })?;
        debug!(endpoint, status = response.status, "api response");

        if !(200..300).contains(&response.status) {
            return Err(SnooError::Api {
                endpoint: endpoint.to_string(),
                status: response.status,
                body: response.body,
            });
        }

        serde_json::from_str(&response.body).map_err(|source| SnooError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_parses_json() {
        let gateway = Gateway::new("https://api.test/", MockTransport::new());
        gateway.transport().respond(200, json!({"ok": true}));

        let data = gateway
            .request("/ss/v2/sessions/last", None, &[], Method::Get, Some("tok"))
            .unwrap();
        assert_eq!(data["ok"], true);

        let requests = gateway.transport().requests();
        assert_eq!(requests[0].url, "https://api.test/ss/v2/sessions/last");
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].header("user-agent"), Some(USER_AGENT));
        assert_eq!(requests[0].header("Authorization"), Some("Bearer tok"));
    }

    #[test]
    fn test_no_bearer_without_token() {
        let gateway = Gateway::new("https://api.test", MockTransport::new());
        gateway.transport().respond(200, json!({}));

        let payload = json!({"username": "u", "password": "p"});
        gateway
            .request("/us/login", Some(&payload), &[], Method::Post, None)
            .unwrap();

        let requests = gateway.transport().requests();
        assert!(requests[0].header("Authorization").is_none());
        assert_eq!(requests[0].body.as_ref(), Some(&payload));
    }

    #[test]
    fn test_query_params_forwarded() {
        let gateway = Gateway::new("https://api.test", MockTransport::new());
        gateway.transport().respond(200, json!({"levels": []}));

        gateway
            .request(
                "/ss/v2/sessions/aggregated",
                None,
                &[("startTime", "12/01/2019 00:00:00".to_string())],
                Method::Get,
                Some("tok"),
            )
            .unwrap();

        let requests = gateway.transport().requests();
        assert_eq!(
            requests[0].query,
            vec![("startTime".to_string(), "12/01/2019 00:00:00".to_string())]
        );
    }

    #[test]
    fn test_non_2xx_is_api_error() {
        let gateway = Gateway::new("https://api.test", MockTransport::new());
        gateway
            .transport()
            .respond_raw(401, r#"{"message":"Unauthorized"}"#);

        let err = gateway
            .request("/ss/v2/sessions/last", None, &[], Method::Get, Some("stale"))
            .unwrap_err();
        match err {
            SnooError::Api {
                endpoint,
                status,
                body,
            } => {
                assert_eq!(endpoint, "/ss/v2/sessions/last");
                assert_eq!(status, 401);
                assert!(body.contains("Unauthorized"));
            }
            other => panic!("expected Api error, got {:?}", other),
        }
        assert_eq!(gateway.transport().request_count(), 1);
    }

    #[test]
    fn test_transport_failure() {
        let gateway = Gateway::new("https://api.test", MockTransport::new());
        gateway.transport().fail("connection refused");

        let err = gateway
            .request("/us/login", None, &[], Method::Post, None)
            .unwrap_err();
        assert!(matches!(err, SnooError::Transport { .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_garbage_body_is_decode_error() {
        let gateway = Gateway::new("https://api.test", MockTransport::new());
        gateway.transport().respond_raw(200, "<html>maintenance</html>");

        let err = gateway
            .request("/ss/v2/sessions/last", None, &[], Method::Get, Some("t"))
            .unwrap_err();
        assert!(matches!(err, SnooError::Decode { .. }));
    }
}
