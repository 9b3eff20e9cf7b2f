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

//! Layer-4 server assembly: TLS passthrough and termination, raw TCP, and
//! UDP routes.

use caddy_config::layer4::{Handler, Match, MatchTls, ProxyHandler, Route, Server, TlsHandler, Upstream};
use gateway_api::apis::standard::gateways::{GatewayListeners, GatewayListenersTlsMode};
use tracing::warn;

use crate::gateway_utils::{compute_hosts_for_listener, namespace_deref_or};
use crate::reference_grants::is_backend_reference_allowed;
use crate::routes::{BackendRef, RouteInfo, RouteKind};
use crate::Result;

use super::{is_route_for_listener, Synthesizer};

impl Synthesizer<'_> {
    // Compiles TLSRoutes attached to a TLS (or HTTPS passthrough) listener
    // into SNI-matched layer4 routes. With TLS mode Terminate the handler
    // chain starts with a TLS termination handler and the listener's
    // certificates are loaded; with passthrough the encrypted stream is
    // proxied as-is.
    pub(super) fn tls_server(
        &mut self,
        mut server: Server,
        listener: &GatewayListeners,
    ) -> Result<Server> {
        let gateway = self.input.gateway;
        let terminate = listener
            .tls
            .as_ref()
            .and_then(|tls| tls.mode.as_ref())
            .is_some_and(|mode| matches!(mode, GatewayListenersTlsMode::Terminate));

        if terminate {
            if let Some(listener_tls) = &listener.tls {
                for cert_ref in listener_tls.certificate_refs.iter().flatten() {
                    let Some(pair) = self.cert_key_pem_pair(cert_ref) else {
                        continue;
                    };
                    if pair.certificate_pem.is_empty() || pair.key_pem.is_empty() {
                        continue;
                    }
                    self.load_pems.push(pair);
                }
            }
        }

        let mut routes = Vec::new();
        for tls_route in self.input.tls_routes {
            let route_namespace = tls_route.metadata.namespace.clone().unwrap_or_default();
            if !is_route_for_listener(
                gateway,
                listener,
                &route_namespace,
                &tls_route.parent_statuses(),
            ) {
                continue;
            }

            let hostnames =
                compute_hosts_for_listener(listener.hostname.as_ref(), &tls_route.hostnames());

            let mut handlers = Vec::new();
            if terminate {
                handlers.push(Handler::Tls(TlsHandler::default()));
            }
            for rule in &tls_route.spec.rules {
                let backends: Vec<BackendRef> = rule
                    .backend_refs
                    .iter()
                    .flatten()
                    .map(backend_view)
                    .collect();
                if let Some(dial) =
                    self.l4_upstream_dial(&backends, &route_namespace, RouteKind::Tls, false)
                {
                    handlers.push(Handler::Proxy(ProxyHandler {
                        upstreams: vec![Upstream {
                            dial: vec![dial],
                            ..Default::default()
                        }],
                        ..Default::default()
                    }));
                }
            }

            routes.push(Route {
                matcher_sets: vec![Match {
                    tls: Some(MatchTls { sni: hostnames }),
                    ..Default::default()
                }],
                handlers,
            });
        }
        server.routes.extend(routes);
        Ok(server)
    }

    pub(super) fn tcp_server(
        &mut self,
        mut server: Server,
        listener: &GatewayListeners,
    ) -> Result<Server> {
        let gateway = self.input.gateway;
        let mut routes = Vec::new();
        for tcp_route in self.input.tcp_routes {
            let route_namespace = tcp_route.metadata.namespace.clone().unwrap_or_default();
            if !is_route_for_listener(
                gateway,
                listener,
                &route_namespace,
                &tcp_route.parent_statuses(),
            ) {
                continue;
            }

            let mut handlers = Vec::new();
            for rule in &tcp_route.spec.rules {
                let backends: Vec<BackendRef> = rule
                    .backend_refs
                    .iter()
                    .flatten()
                    .map(backend_view)
                    .collect();
                if let Some(dial) =
                    self.l4_upstream_dial(&backends, &route_namespace, RouteKind::Tcp, false)
                {
                    handlers.push(Handler::Proxy(ProxyHandler {
                        upstreams: vec![Upstream {
                            dial: vec![dial],
                            ..Default::default()
                        }],
                        ..Default::default()
                    }));
                }
            }

            routes.push(Route {
                matcher_sets: vec![],
                handlers,
            });
        }
        server.routes.extend(routes);
        Ok(server)
    }

    pub(super) fn udp_server(
        &mut self,
        mut server: Server,
        listener: &GatewayListeners,
    ) -> Result<Server> {
        let gateway = self.input.gateway;
        let mut routes = Vec::new();
        for udp_route in self.input.udp_routes {
            let route_namespace = udp_route.metadata.namespace.clone().unwrap_or_default();
            if !is_route_for_listener(
                gateway,
                listener,
                &route_namespace,
                &udp_route.parent_statuses(),
            ) {
                continue;
            }

            let mut handlers = Vec::new();
            for rule in &udp_route.spec.rules {
                let backends: Vec<BackendRef> = rule
                    .backend_refs
                    .iter()
                    .flatten()
                    .map(backend_view)
                    .collect();
                if let Some(dial) =
                    self.l4_upstream_dial(&backends, &route_namespace, RouteKind::Udp, true)
                {
                    handlers.push(Handler::Proxy(ProxyHandler {
                        upstreams: vec![Upstream {
                            dial: vec![dial],
                            ..Default::default()
                        }],
                        ..Default::default()
                    }));
                }
            }

            routes.push(Route {
                matcher_sets: vec![],
                handlers,
            });
        }
        server.routes.extend(routes);
        Ok(server)
    }

    // Resolves the single backend of a layer4 rule to a dial address. The
    // layer4 proxy has no weighted selection, so rules with more or fewer
    // than one backend are skipped.
    fn l4_upstream_dial(
        &self,
        backends: &[BackendRef],
        route_namespace: &str,
        kind: RouteKind,
        udp: bool,
    ) -> Option<String> {
        if backends.len() != 1 {
            if backends.len() > 1 {
                warn!(
                    kind = kind.as_str(),
                    "layer4 rules support exactly one backend; extra backends are ignored",
                );
            }
            return None;
        }
        let backend = &backends[0];
        if !backend.is_service() {
            return None;
        }
        let port = backend.port?;
        let namespace = namespace_deref_or(backend.namespace.as_ref(), route_namespace);
        if namespace != route_namespace
            && !is_backend_reference_allowed(
                route_namespace,
                backend,
                kind.as_str(),
                self.input.grants,
            )
        {
            return None;
        }

        let service = self.find_service(&namespace, &backend.name)?;
        let cluster_ip = service
            .spec
            .as_ref()
            .and_then(|spec| spec.cluster_ip.as_deref())
            .filter(|ip| !ip.is_empty() && *ip != "None")?;

        if udp {
            Some(format!("udp/{cluster_ip}:{port}"))
        } else {
            Some(format!("{cluster_ip}:{port}"))
        }
    }
}

fn backend_view<B>(backend: &B) -> BackendRef
where
    B: L4BackendRef,
{
    BackendRef {
        group: backend.group(),
        kind: backend.kind(),
        name: backend.name(),
        namespace: backend.namespace(),
        port: backend.port(),
        weight: backend.weight(),
    }
}

// The experimental route kinds each generate their own backendRef struct;
// this small trait lets the layer4 assembly treat them alike.
trait L4BackendRef {
    fn group(&self) -> Option<String>;
    fn kind(&self) -> Option<String>;
    fn name(&self) -> String;
    fn namespace(&self) -> Option<String>;
    fn port(&self) -> Option<i32>;
    fn weight(&self) -> Option<i32>;
}

macro_rules! impl_l4_backend_ref {
    ($ty:path) => {
        impl L4BackendRef for $ty {
            fn group(&self) -> Option<String> {
                self.group.clone()
            }
            fn kind(&self) -> Option<String> {
                self.kind.clone()
            }
            fn name(&self) -> String {
                self.name.clone()
            }
            fn namespace(&self) -> Option<String> {
                self.namespace.clone()
            }
            fn port(&self) -> Option<i32> {
                self.port
            }
            fn weight(&self) -> Option<i32> {
                self.weight
            }
        }
    };
}

impl_l4_backend_ref!(gateway_api::apis::experimental::tcproutes::TCPRouteRulesBackendRefs);
impl_l4_backend_ref!(gateway_api::apis::experimental::tlsroutes::TLSRouteRulesBackendRefs);
impl_l4_backend_ref!(gateway_api::apis::experimental::udproutes::UDPRouteRulesBackendRefs);
