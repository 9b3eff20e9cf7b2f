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

//! Compiles a Gateway and its attached routes into a Caddy configuration.
//!
//! Synthesis is a pure function over a snapshot of the relevant cluster
//! objects; identical inputs produce byte-identical JSON.

mod http;
mod layer4;
mod matchers;
mod tls;

pub(crate) use tls::is_secret_ref;

use std::collections::BTreeMap;

use caddy_config::http::{
    self as caddyhttp, AutoHttpsConfig, Handler, HttpErrorConfig, Metrics, Route, StaticResponse,
};
use caddy_config::tls::{CertKeyPemPair, Certificates, Tls};
use caddy_config::{layer4 as caddyl4, AdminConfig, Apps, Config, Duration};
use gateway_api::apis::experimental::tcproutes::TCPRoute;
use gateway_api::apis::experimental::tlsroutes::TLSRoute;
use gateway_api::apis::experimental::udproutes::UDPRoute;
use gateway_api::apis::standard::gateways::{Gateway, GatewayListeners, GatewayListenersTlsMode};
use gateway_api::apis::experimental::grpcroutes::GRPCRoute;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};

use crate::backend_tls_policy::BackendTLSPolicy;
use crate::consts::CADDY_ADMIN_LISTEN;
use crate::gateway_utils::{matches_controller_name, namespace_deref_or};
use crate::routes::ParentStatus;
use crate::Result;

// Input is the snapshot a Gateway reconcile hands to the synthesizer. Routes
// have already been filtered down to the ones attached to this Gateway;
// Secrets and ConfigMaps hold the TLS material referenced by listeners and
// BackendTLSPolicies.
pub struct Input<'a> {
    pub gateway: &'a Gateway,

    pub http_routes: &'a [HTTPRoute],
    // GRPC routes are validated and filtered but not yet compiled.
    pub grpc_routes: &'a [GRPCRoute],
    pub tcp_routes: &'a [TCPRoute],
    pub tls_routes: &'a [TLSRoute],
    pub udp_routes: &'a [UDPRoute],

    pub grants: &'a [ReferenceGrant],
    pub backend_tls_policies: &'a [BackendTLSPolicy],

    pub services: &'a [Service],
    pub secrets: &'a [Secret],
    pub config_maps: &'a [ConfigMap],
}

impl Input<'_> {
    // Generates the JSON config for the Caddy data plane.
    pub fn config(&self) -> Result<Vec<u8>> {
        let mut synthesizer = Synthesizer {
            input: self,
            http_servers: BTreeMap::new(),
            layer4_servers: BTreeMap::new(),
            load_pems: Vec::new(),
        };
        synthesizer.synthesize()
    }
}

struct Synthesizer<'a> {
    input: &'a Input<'a>,
    http_servers: BTreeMap<String, caddyhttp::Server>,
    layer4_servers: BTreeMap<String, caddyl4::Server>,
    load_pems: Vec<CertKeyPemPair>,
}

impl Synthesizer<'_> {
    fn synthesize(&mut self) -> Result<Vec<u8>> {
        for listener in &self.input.gateway.spec.listeners {
            self.handle_listener(listener)?;
        }

        let mut apps = Apps::default();
        if !self.http_servers.is_empty() {
            // Register a catch-all route on every server that will match any
            // request that didn't already get handled.
            for server in self.http_servers.values_mut() {
                server.routes.push(catch_all_route());
            }
            apps.http = Some(caddyhttp::App {
                servers: std::mem::take(&mut self.http_servers),
                // Bound how long Caddy waits for old servers to drain during
                // a config reload; without it a reload can hang indefinitely.
                grace_period: Some(Duration::from_secs(15)),
                ..Default::default()
            });
        }
        if !self.layer4_servers.is_empty() {
            apps.layer4 = Some(caddyl4::App {
                servers: std::mem::take(&mut self.layer4_servers),
            });
        }
        if !self.load_pems.is_empty() {
            apps.tls = Some(Tls {
                certificates: Some(Certificates {
                    load_pem: std::mem::take(&mut self.load_pems),
                    ..Default::default()
                }),
                disable_ocsp_stapling: true,
            });
        }

        let config = Config {
            admin: Some(AdminConfig {
                listen: CADDY_ADMIN_LISTEN.to_string(),
                ..Default::default()
            }),
            apps: Some(apps),
        };
        Ok(serde_json::to_vec(&config)?)
    }

    fn handle_listener(&mut self, listener: &GatewayListeners) -> Result<()> {
        match listener.protocol.as_str() {
            "HTTP" => self.handle_http_listener(listener),
            "HTTPS" => {
                // HTTPS with TLS mode Terminate (or unset) is decrypted and
                // routed by the HTTP server; passthrough requires layer4 SNI
                // routing since the request stays encrypted.
                if is_passthrough(listener) {
                    self.handle_layer4_listener(listener)
                } else {
                    self.handle_http_listener(listener)
                }
            }
            "TLS" | "TCP" | "UDP" => self.handle_layer4_listener(listener),
            _ => Ok(()),
        }
    }

    fn handle_http_listener(&mut self, listener: &GatewayListeners) -> Result<()> {
        let key = listener.port.to_string();
        let server = self
            .http_servers
            .remove(&key)
            .unwrap_or_else(|| new_http_server(listener.port));
        let server = self.http_server(server, listener)?;
        self.http_servers.insert(key, server);
        Ok(())
    }

    fn handle_layer4_listener(&mut self, listener: &GatewayListeners) -> Result<()> {
        let (key_proto, listen_proto) = match listener.protocol.as_str() {
            "TLS" | "HTTPS" => ("tls", "tcp"),
            "TCP" => ("tcp", "tcp"),
            "UDP" => ("udp", "udp"),
            _ => return Ok(()),
        };
        let key = format!("{key_proto}/{}", listener.port);
        let server = self.layer4_servers.remove(&key).unwrap_or_else(|| caddyl4::Server {
            listen: vec![format!("{listen_proto}/:{}", listener.port)],
            ..Default::default()
        });
        let server = match listener.protocol.as_str() {
            "TLS" | "HTTPS" => self.tls_server(server, listener)?,
            "TCP" => self.tcp_server(server, listener)?,
            "UDP" => self.udp_server(server, listener)?,
            _ => return Ok(()),
        };
        self.layer4_servers.insert(key, server);
        Ok(())
    }
}

fn is_passthrough(listener: &GatewayListeners) -> bool {
    listener
        .tls
        .as_ref()
        .and_then(|tls| tls.mode.as_ref())
        .is_some_and(|mode| matches!(mode, GatewayListenersTlsMode::Passthrough))
}

fn new_http_server(port: i32) -> caddyhttp::Server {
    caddyhttp::Server {
        listen: vec![format!(":{port}")],
        // Automatic HTTPS would fight with the certificates and redirects we
        // compile from the Gateway spec.
        auto_https: Some(AutoHttpsConfig {
            disable: true,
            ..Default::default()
        }),
        // Metrics are scraped through the Caddy admin endpoint.
        metrics: Some(Metrics::default()),
        errors: Some(HttpErrorConfig {
            routes: vec![Route {
                handlers: vec![Handler::StaticResponse(StaticResponse {
                    close: true,
                    status_code: Some("{http.error.status_code}".into()),
                    body: "{http.error.status_code} {http.error.status_text}\n\n{http.error.message}\n".to_string(),
                    headers: instance_headers(),
                    ..Default::default()
                })],
                terminal: true,
                ..Default::default()
            }],
        }),
        ..Default::default()
    }
}

fn catch_all_route() -> Route {
    Route {
        handlers: vec![Handler::StaticResponse(StaticResponse {
            close: true,
            // 421 Misdirected Request
            status_code: Some("421".into()),
            body: "unable to route request\n".to_string(),
            headers: instance_headers(),
            ..Default::default()
        })],
        terminal: true,
        ..Default::default()
    }
}

fn instance_headers() -> caddyhttp::Headers {
    let mut headers = caddyhttp::Headers::new();
    headers.insert(
        "Caddy-Instance".to_string(),
        vec!["{system.hostname}".to_string()],
    );
    headers
}

// Returns true if the route's recorded parent statuses bind it to this
// Gateway and listener, honoring sectionName and port constraints.
pub(crate) fn is_route_for_listener(
    gateway: &Gateway,
    listener: &GatewayListeners,
    route_namespace: &str,
    parents: &[ParentStatus],
) -> bool {
    let gateway_namespace = gateway.metadata.namespace.as_deref().unwrap_or_default();
    let gateway_name = gateway.metadata.name.as_deref().unwrap_or_default();

    parents.iter().any(|parent| {
        if !matches_controller_name(&parent.controller_name) {
            return false;
        }
        let parent_ref = &parent.parent_ref;
        if !parent_ref.is_gateway() {
            return false;
        }
        if namespace_deref_or(parent_ref.namespace.as_ref(), route_namespace) != gateway_namespace {
            return false;
        }
        if parent_ref.name != gateway_name {
            return false;
        }

        // If both sectionName and port are unset, allow the route.
        if parent_ref.section_name.is_none() && parent_ref.port.is_none() {
            return true;
        }
        let section_check = parent_ref
            .section_name
            .as_deref()
            .is_none_or(|section| section == listener.name);
        let port_check = parent_ref.port.is_none_or(|port| port == listener.port);
        section_check && port_check
    })
}
