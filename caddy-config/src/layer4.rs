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

//! The `layer4` Caddy app: raw TCP/UDP servers with composable matchers and
//! handlers, used for TLS passthrough and L4 proxying.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::duration::Duration;
use crate::http::TlsConfig;
use crate::is_false;
use crate::tls::ConnectionPolicy;

// App is the configuration for the `layer4` app on a Caddy server.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub servers: BTreeMap<String, Server>,
}

// Server represents a Caddy layer4 server.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    // The network addresses to bind to, e.g. `tcp/:8080` or `udp/:53`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listen: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    // How long to wait for matching before giving up and closing the
    // connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_timeout: Option<Duration>,
}

// Route matches incoming connections and executes its handler chain.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(
        rename = "match",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub matcher_sets: Vec<Match>,

    #[serde(
        rename = "handle",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub handlers: Vec<Handler>,
}

// Match represents a layer4 matcher set.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<MatchDns>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<MatchPostgres>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<MatchSsh>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<MatchTls>,
}

// MatchTls matches TLS connections, optionally by attributes of the
// ClientHello.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchTls {
    // Server names to match against the SNI extension.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sni: Vec<String>,
}

// MatchDns matches DNS queries against allow and deny rules.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDns {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<MatchDnsRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<MatchDnsRule>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub default_deny: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub prefer_allow: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDnsRule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class_regexp: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name_regexp: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub record_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub type_regexp: String,
}

// MatchPostgres matches connections that start the PostgreSQL protocol.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPostgres {}

// MatchSsh matches connections that start the SSH protocol.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSsh {}

// Handler is one step in a layer4 handler chain, tagged with the Caddy
// module name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
pub enum Handler {
    // Terminates TLS before passing the connection on.
    Tls(TlsHandler),
    // Proxies the connection to one or more upstreams.
    Proxy(ProxyHandler),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsHandler {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection_policies: Vec<ConnectionPolicy>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyHandler {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<Upstream>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_checks: Option<HealthChecks>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancing: Option<LoadBalancing>,

    // The PROXY protocol version to send to the upstream; `v1` or `v2`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proxy_protocol: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    // The network addresses to dial; UDP upstreams use a `udp/` prefix.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dial: Vec<String>,

    // If set, connections to the upstream are encrypted with TLS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub max_connections: usize,
}

// HealthChecks and LoadBalancing are modeled for completeness; the
// synthesizer never populates them.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthChecks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveHealthChecks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passive: Option<PassiveHealthChecks>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveHealthChecks {
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveHealthChecks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub max_fails: usize,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub unhealthy_connection_count: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancing {
    #[serde(rename = "selection", skip_serializing_if = "Option::is_none")]
    pub selection_policy: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub try_duration: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub try_interval: Option<Duration>,
}

fn is_zero_usize(v: &usize) -> bool {
    *v == 0
}

fn is_zero_u16(v: &u16) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sni_route_matches_wire_format() {
        let route = Route {
            matcher_sets: vec![Match {
                tls: Some(MatchTls {
                    sni: vec!["api.example.com".into()],
                }),
                ..Default::default()
            }],
            handlers: vec![Handler::Proxy(ProxyHandler {
                upstreams: vec![Upstream {
                    dial: vec!["10.0.0.2:6443".into()],
                    ..Default::default()
                }],
                ..Default::default()
            })],
        };
        assert_eq!(
            serde_json::to_string(&route).unwrap(),
            concat!(
                r#"{"match":[{"tls":{"sni":["api.example.com"]}}],"#,
                r#""handle":[{"handler":"proxy","upstreams":[{"dial":["10.0.0.2:6443"]}]}]}"#,
            ),
        );
    }

    #[test]
    fn udp_upstream_keeps_network_prefix() {
        let upstream = Upstream {
            dial: vec!["udp/10.0.0.3:53".into()],
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&upstream).unwrap(),
            r#"{"dial":["udp/10.0.0.3:53"]}"#,
        );
    }
}
