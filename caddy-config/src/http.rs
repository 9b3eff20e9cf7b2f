/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! The `http` Caddy app: servers, routes, request matchers, and handlers.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::duration::Duration;
use crate::is_false;
use crate::tls::{CaPool, ConnectionPolicy};

// Header fields, keyed by field name. BTreeMap keeps serialization stable.
pub type Headers = BTreeMap<String, Vec<String>>;

// App is the configuration for the `http` app on a Caddy server.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    // The port to use for HTTP. Used for automatic HTTPS redirects.
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub http_port: u16,

    // The port to use for HTTPS.
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub https_port: u16,

    // How long to allow servers to shut down gracefully before forcefully
    // closing connections during a config reload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period: Option<Duration>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub servers: BTreeMap<String, Server>,
}

// Server describes an HTTP server.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    // Socket addresses to which to bind listeners, e.g. `:8080`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listen: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_header_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_interval: Option<Duration>,

    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub max_header_bytes: usize,

    // The routes of this server, applied in order to each request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    // How to handle errors returned from the routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<HttpErrorConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls_connection_policies: Vec<ConnectionPolicy>,

    // Configures or disables automatic HTTPS within this server.
    #[serde(rename = "automatic_https", skip_serializing_if = "Option::is_none")]
    pub auto_https: Option<AutoHttpsConfig>,

    // If true, a request's Host header must match the ServerName sent by the
    // client's TLS ClientHello.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_sni_host: Option<bool>,

    // HTTP protocols to enable: `h1`, `h2`, `h2c`, `h3`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,

    // If set, metrics observations will be enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoHttpsConfig {
    // If true, automatic HTTPS will be entirely disabled.
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable: bool,

    // If true, only the HTTP->HTTPS redirects are disabled.
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_redirects: bool,

    // If true, automated certificate management is disabled.
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_certificates: bool,

    // Hosts to not include in automatic HTTPS.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_certificates: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "is_false")]
    pub per_host: bool,
}

// HttpErrorConfig determines how to handle errors from the HTTP handlers.
// Error routes may use the `{http.error.status_code}`,
// `{http.error.status_text}` and `{http.error.message}` placeholders.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpErrorConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
}

// Route consists of a set of rules for matching HTTP requests, a list of
// handlers to execute, and optional flow control parameters.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,

    // The matcher sets which qualify this route for a request. Each matcher
    // set is OR'ed, but matchers within a set are AND'ed together.
    #[serde(
        rename = "match",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub matcher_sets: Vec<Match>,

    // Handlers are chained in middleware fashion: requests flow from the
    // first handler to the last.
    #[serde(
        rename = "handle",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub handlers: Vec<Handler>,

    // If true, no more routes will be executed after this one.
    #[serde(default, skip_serializing_if = "is_false")]
    pub terminal: bool,
}

// Match represents a matcher set: all present terms must match the request.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<MatchIp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: Headers,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header_regexp: BTreeMap<String, MatchRegexp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub method: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not: Vec<Match>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    #[serde(rename = "path_regexp", skip_serializing_if = "Option::is_none")]
    pub path_re: Option<MatchRegexp>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<MatchIp>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars_regexp: BTreeMap<String, MatchRegexp>,
}

impl Match {
    pub fn is_empty(&self) -> bool {
        self.client_ip.is_none()
            && self.expression.is_none()
            && self.header.is_empty()
            && self.header_regexp.is_empty()
            && self.host.is_empty()
            && self.method.is_empty()
            && self.not.is_empty()
            && self.path.is_empty()
            && self.path_re.is_none()
            && self.protocol.is_empty()
            && self.query.is_empty()
            && self.remote_ip.is_none()
            && self.vars.is_empty()
            && self.vars_regexp.is_empty()
    }
}

// MatchIp matches requests by IP address or CIDR range.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchIp {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<String>,
}

// MatchRegexp matches using an RE2 regular expression; captures become
// request placeholders.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRegexp {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub pattern: String,
}

// Handler is one middleware in a route's handler chain. The serialized form
// carries the Caddy module name in the `handler` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
pub enum Handler {
    StaticResponse(StaticResponse),
    Error(StaticError),
    Headers(HeadersHandler),
    ReverseProxy(ReverseProxy),
    Rewrite(Rewrite),
    Subroute(Subroute),
    Tracing(Tracing),
    Vars(BTreeMap<String, serde_json::Value>),
}

// StaticResponse implements a simple responder for static responses.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticResponse {
    // The HTTP status code to respond with. Can be an integer or, if needing
    // to use a placeholder, a string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<WeakString>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: Headers,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,

    // If true, the server will close the client's connection after writing
    // the response.
    #[serde(default, skip_serializing_if = "is_false")]
    pub close: bool,

    // Immediately and forcefully closes the connection without writing a
    // response.
    #[serde(default, skip_serializing_if = "is_false")]
    pub abort: bool,
}

// StaticError returns an error value without writing a response, for use by
// the server's error handling logic.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticError {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<WeakString>,
}

// HeadersHandler modifies request and response headers.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadersHandler {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<HeaderOps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<RespHeaderOps>,
}

// HeaderOps defines manipulations for HTTP headers.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderOps {
    // Adds HTTP headers; does not replace any existing header fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: Headers,

    // Sets HTTP headers; replaces existing header fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: Headers,

    // Names of HTTP header fields to delete.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<String>,

    // In-situ substring replacements, keyed by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub replace: BTreeMap<String, Vec<Replacement>>,
}

impl HeaderOps {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.set.is_empty() && self.delete.is_empty() && self.replace.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub search: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub search_regexp: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replace: String,
}

// RespHeaderOps defines manipulations for response headers.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespHeaderOps {
    #[serde(flatten)]
    pub ops: HeaderOps,

    // If set, header operations are deferred and only performed if the
    // response matches these criteria.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require: Option<ResponseMatcher>,

    // If true, header operations are deferred until the response is written
    // out.
    #[serde(default, skip_serializing_if = "is_false")]
    pub deferred: bool,
}

// ResponseMatcher qualifies response header operations.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMatcher {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_code: Vec<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: Headers,
}

// ReverseProxy is a highly configurable reverse proxy handler.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseProxy {
    // The method of transport for the proxy; plaintext HTTP by default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancing: Option<LoadBalancing>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_checks: Option<HealthChecks>,

    // The static list of backends to proxy to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<Upstream>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_interval: Option<Duration>,

    // IP ranges from which X-Forwarded-* header values should be trusted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_proxies: Vec<String>,

    // Manipulates headers between Caddy and the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeadersHandler>,

    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub request_buffers: i64,

    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub response_buffers: i64,
}

// Upstream is a single backend host.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    // The network address to dial, e.g. `10.0.0.1:8080`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dial: String,

    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub max_requests: usize,
}

// LoadBalancing distributes load between backends. Modeled for completeness;
// the synthesizer never populates it.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_policy: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub retries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub try_duration: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub try_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_match: Vec<Match>,
}

// HealthChecks update the status of backends. Modeled for completeness; the
// synthesizer never populates it.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthChecks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveHealthChecks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passive: Option<PassiveHealthChecks>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveHealthChecks {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub max_size: i64,
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub expect_status: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expect_body: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveHealthChecks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub max_fails: usize,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub unhealthy_request_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unhealthy_status: Vec<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unhealthy_latency: Option<Duration>,
}

// Transport performs the round trip to the backend. Tagged with the Caddy
// module name in the `protocol` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum Transport {
    Http(HttpTransport),
}

impl Default for Transport {
    fn default() -> Self {
        Self::Http(HttpTransport::default())
    }
}

// HttpTransport is essentially a configuration wrapper over an HTTP client.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpTransport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<UpstreamResolver>,

    // Configures TLS to the upstream. Setting this to an empty value enables
    // TLS with reasonable defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<KeepAlive>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<bool>,

    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub max_conns_per_host: usize,

    // The PROXY protocol version to use when connecting to the upstream, if
    // the upstream supports receiving it; `v1` or `v2`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proxy_protocol: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dial_timeout: Option<Duration>,
    #[serde(rename = "dial_fallback_delay", skip_serializing_if = "Option::is_none")]
    pub fallback_delay: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_header_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect_continue_timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub max_response_header_size: i64,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub write_buffer_size: usize,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub read_buffer_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<Duration>,

    // The versions of HTTP to support. Valid values include `1.1`, `2`,
    // `h2c`, and `3`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,
}

// TlsConfig configures TLS from the proxy to the upstream.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    // The CA pool to use when verifying the upstream certificate. Caddy
    // defaults to system trust when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<CaPool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub root_ca_pool: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub root_ca_pem_files: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_certificate_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_certificate_key_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_certificate_automate: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure_skip_verify: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub handshake_timeout: Option<Duration>,

    // The server name used when verifying the upstream certificate.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub renegotiation: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub except_ports: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub curves: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepAlive {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub max_idle_conns: usize,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub max_idle_conns_per_host: usize,
    #[serde(rename = "idle_timeout", skip_serializing_if = "Option::is_none")]
    pub idle_conn_timeout: Option<Duration>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamResolver {
    // The addresses of DNS resolvers to use when looking up upstreams.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

// Rewrite manipulates the URL of a request internally.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rewrite {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    // Changes the request's URI: a path with optional query string.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,

    // Strips the given prefix from the beginning of the request's path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub strip_path_prefix: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub strip_path_suffix: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uri_substring: Vec<SubstrReplacer>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_regexp: Vec<RegexReplacer>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstrReplacer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub find: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replace: String,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub limit: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexReplacer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub find: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replace: String,
}

// Subroute compiles and executes routes, useful for a batch of routes that
// all inherit the same matchers.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subroute {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<HttpErrorConfig>,
}

// Tracing instruments the request with an OpenTelemetry span.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracing {
    #[serde(rename = "span", default, skip_serializing_if = "String::is_empty")]
    pub span_name: String,
}

// WeakString is a string that may be unmarshalled from either a JSON string
// or number, matching Caddy's lenient status code fields.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeakString(pub String);

impl From<&str> for WeakString {
    fn from(v: &str) -> Self {
        Self(v.to_owned())
    }
}

impl From<String> for WeakString {
    fn from(v: String) -> Self {
        Self(v)
    }
}

impl fmt::Display for WeakString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for WeakString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WeakString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WeakStringVisitor;

        impl Visitor<'_> for WeakStringVisitor {
            type Value = WeakString;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<WeakString, E> {
                Ok(WeakString(v.to_owned()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<WeakString, E> {
                Ok(WeakString(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<WeakString, E> {
                Ok(WeakString(v.to_string()))
            }
        }

        deserializer.deserialize_any(WeakStringVisitor)
    }
}

fn is_zero_u16(v: &u16) -> bool {
    *v == 0
}

fn is_zero_usize(v: &usize) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_carry_their_discriminator() {
        let handlers = vec![
            Handler::StaticResponse(StaticResponse {
                status_code: Some("302".into()),
                ..Default::default()
            }),
            Handler::ReverseProxy(ReverseProxy {
                upstreams: vec![Upstream {
                    dial: "10.0.0.1:8080".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            Handler::Rewrite(Rewrite {
                strip_path_prefix: "/api".into(),
                ..Default::default()
            }),
        ];
        let raw = serde_json::to_string(&handlers).unwrap();
        assert_eq!(
            raw,
            concat!(
                r#"[{"handler":"static_response","status_code":"302"},"#,
                r#"{"handler":"reverse_proxy","upstreams":[{"dial":"10.0.0.1:8080"}]},"#,
                r#"{"handler":"rewrite","strip_path_prefix":"/api"}]"#,
            ),
        );

        let parsed: Vec<Handler> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, handlers);
    }

    #[test]
    fn transport_is_tagged_with_protocol() {
        let transport = Transport::Http(HttpTransport {
            versions: vec!["h2c".into()],
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_string(&transport).unwrap(),
            r#"{"protocol":"http","versions":["h2c"]}"#,
        );
    }

    #[test]
    fn empty_match_serializes_to_empty_object() {
        let m = Match::default();
        assert!(m.is_empty());
        assert_eq!(serde_json::to_string(&m).unwrap(), "{}");

        let m = Match {
            path: vec!["/api*".into()],
            ..Default::default()
        };
        assert!(!m.is_empty());
    }

    #[test]
    fn route_uses_caddy_field_names() {
        let route = Route {
            matcher_sets: vec![Match {
                host: vec!["api.example.com".into()],
                ..Default::default()
            }],
            handlers: vec![Handler::Subroute(Subroute::default())],
            terminal: true,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&route).unwrap(),
            r#"{"match":[{"host":["api.example.com"]}],"handle":[{"handler":"subroute"}],"terminal":true}"#,
        );
    }
}
