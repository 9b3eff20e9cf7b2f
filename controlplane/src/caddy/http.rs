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

//! HTTP server assembly: routes, filters, and backend proxy handlers.

use caddy_config::http::{
    HeaderOps, Handler, HeadersHandler, HttpTransport, Match, ReverseProxy, RespHeaderOps, Rewrite,
    Route, StaticResponse, Subroute, Transport, TlsConfig, Upstream,
};
use caddy_config::tls::{CaPool, ConnectionMatchers, ConnectionPolicy};
use gateway_api::apis::standard::gateways::GatewayListeners;
use gateway_api::apis::standard::httproutes::{
    HTTPRouteRulesBackendRefs, HTTPRouteRulesFilters, HTTPRouteRulesFiltersRequestRedirectPathType,
    HTTPRouteRulesFiltersRequestRedirectScheme, HTTPRouteRulesFiltersType,
    HTTPRouteRulesFiltersUrlRewritePathType,
};
use k8s_openapi::api::core::v1::Service;
use tracing::warn;

use crate::backend_tls_policy::BackendTLSPolicy;
use crate::consts::{APP_PROTOCOL_H2C, APP_PROTOCOL_WS};
use crate::gateway_utils::namespace_deref_or;
use crate::reference_grants::is_backend_reference_allowed;
use crate::routes::{BackendRef, RouteInfo};
use crate::Result;

use super::matchers::{header_matcher, method_matcher, path_matcher, query_matcher};
use super::tls::parse_pem_certificates;
use super::{is_route_for_listener, Synthesizer};

impl Synthesizer<'_> {
    pub(super) fn http_server(
        &mut self,
        mut server: caddy_config::http::Server,
        listener: &GatewayListeners,
    ) -> Result<caddy_config::http::Server> {
        let gateway = self.input.gateway;
        let hostname = listener.hostname.clone().unwrap_or_default();

        let mut routes = Vec::new();
        for http_route in self.input.http_routes {
            let route_namespace = http_route.metadata.namespace.clone().unwrap_or_default();
            if !is_route_for_listener(
                gateway,
                listener,
                &route_namespace,
                &http_route.parent_statuses(),
            ) {
                continue;
            }

            let mut terminal = false;
            let mut matchers = Vec::new();
            let mut handlers = Vec::new();

            // Match hostnames if any are specified.
            if let Some(hostnames) = &http_route.spec.hostnames {
                if !hostnames.is_empty() {
                    matchers.push(Match {
                        host: hostnames.clone(),
                        ..Default::default()
                    });
                }
            }

            for rule in http_route.spec.rules.iter().flatten() {
                let mut matcher = Match::default();
                for m in rule.matches.iter().flatten() {
                    if let Some(path) = &m.path {
                        path_matcher(&mut matcher, path);
                    }
                    if let Some(headers) = &m.headers {
                        header_matcher(&mut matcher, headers);
                    }
                    if let Some(params) = &m.query_params {
                        query_matcher(&mut matcher, params);
                    }
                    if let Some(method) = &m.method {
                        method_matcher(&mut matcher, method);
                    }
                }

                let mut rule_handlers = Vec::new();
                for filter in rule.filters.iter().flatten() {
                    if let Some(handler) =
                        filter_handler(filter, listener, &matcher, &mut terminal)
                    {
                        rule_handlers.push(handler);
                    }
                }
                for backend in rule.backend_refs.iter().flatten() {
                    if let Some(handler) = self.backend_handler(backend, &route_namespace) {
                        rule_handlers.push(handler);
                    }
                }

                if !matcher.is_empty() {
                    handlers.push(Handler::Subroute(Subroute {
                        routes: vec![Route {
                            matcher_sets: vec![matcher],
                            handlers: rule_handlers,
                            ..Default::default()
                        }],
                        errors: None,
                    }));
                } else {
                    handlers.extend(rule_handlers);
                }
            }

            // If the route has no handlers and no matchers, ignore it.
            if handlers.is_empty() && matchers.is_empty() {
                continue;
            }

            routes.push(Route {
                matcher_sets: matchers,
                handlers,
                terminal,
                ..Default::default()
            });
        }
        server.routes.extend(routes);

        // TLS may be set at this point, but the mode is Terminate;
        // passthrough listeners are compiled as layer4 servers instead.
        let Some(listener_tls) = &listener.tls else {
            return Ok(server);
        };

        if !hostname.is_empty() {
            server.tls_connection_policies.push(ConnectionPolicy {
                matchers: Some(ConnectionMatchers {
                    sni: vec![hostname.clone()],
                }),
                ..Default::default()
            });
        }

        for cert_ref in listener_tls.certificate_refs.iter().flatten() {
            // Ignore incomplete certificate pairs.
            let Some(pair) = self.cert_key_pem_pair(cert_ref) else {
                continue;
            };
            if pair.certificate_pem.is_empty() || pair.key_pem.is_empty() {
                continue;
            }
            self.load_pems.push(pair);
        }
        Ok(server)
    }

    // Compiles one backendRef into a reverse_proxy handler, or nothing when
    // the reference is invalid or not permitted.
    fn backend_handler(
        &self,
        backend: &HTTPRouteRulesBackendRefs,
        route_namespace: &str,
    ) -> Option<Handler> {
        let view = BackendRef {
            group: backend.group.clone(),
            kind: backend.kind.clone(),
            name: backend.name.clone(),
            namespace: backend.namespace.clone(),
            port: backend.port,
            weight: backend.weight,
        };
        if !view.is_service() {
            return None;
        }
        let port = backend.port?;
        let namespace = namespace_deref_or(backend.namespace.as_ref(), route_namespace);
        if namespace != route_namespace
            && !is_backend_reference_allowed(route_namespace, &view, "HTTPRoute", self.input.grants)
        {
            return None;
        }

        let service = self.find_service(&namespace, &backend.name)?;
        let service_port = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .and_then(|ports| ports.iter().find(|p| p.port == port));

        let policy = self.policy_for_service(service);
        let mut transport = HttpTransport::default();
        if let Some(policy) = policy {
            let mut tls = TlsConfig::default();
            let validation = &policy.spec.validation;
            if !validation.hostname.is_empty() {
                tls.server_name = validation.hostname.clone();
            }
            // Caddy defaults to system trust unless the pool is overridden.
            if !validation.ca_certificate_refs.is_empty() {
                let mut certs = Vec::new();
                for ca_ref in &validation.ca_certificate_refs {
                    let Some(pem) = self.ca_pool_pem(ca_ref) else {
                        continue;
                    };
                    certs.extend(parse_pem_certificates(&pem));
                }
                tls.ca = Some(CaPool::Inline {
                    trusted_ca_certs: certs,
                });
            }
            transport.tls = Some(tls);
        } else if let Some(app_protocol) = service_port.and_then(|p| p.app_protocol.as_deref()) {
            // ref; https://gateway-api.sigs.k8s.io/guides/backend-protocol/
            match app_protocol {
                // h2c (HTTP/2 over cleartext) needs an explicit opt-in on
                // the transport.
                APP_PROTOCOL_H2C => transport.versions = vec!["h2c".to_string()],
                // Caddy proxies WebSockets without extra configuration.
                APP_PROTOCOL_WS => {}
                _ => {}
            }
        }

        let cluster_ip = service
            .spec
            .as_ref()
            .and_then(|spec| spec.cluster_ip.as_deref())
            .filter(|ip| !ip.is_empty() && *ip != "None")?;

        Some(Handler::ReverseProxy(ReverseProxy {
            transport: Some(Transport::Http(transport)),
            upstreams: vec![Upstream {
                dial: format!("{cluster_ip}:{port}"),
                ..Default::default()
            }],
            ..Default::default()
        }))
    }

    pub(super) fn find_service(&self, namespace: &str, name: &str) -> Option<&Service> {
        self.input.services.iter().find(|service| {
            service.metadata.namespace.as_deref() == Some(namespace)
                && service.metadata.name.as_deref() == Some(name)
        })
    }

    // Finds the BackendTLSPolicy targeting the Service, if any. Target
    // references are local, so the policy must live in the Service's
    // namespace.
    fn policy_for_service(&self, service: &Service) -> Option<&BackendTLSPolicy> {
        self.input.backend_tls_policies.iter().find(|policy| {
            policy.metadata.namespace == service.metadata.namespace
                && policy.spec.target_refs.iter().any(|target| {
                    target.is_service() && Some(target.name.as_str()) == service.metadata.name.as_deref()
                })
        })
    }
}

fn filter_handler(
    filter: &HTTPRouteRulesFilters,
    listener: &GatewayListeners,
    matcher: &Match,
    terminal: &mut bool,
) -> Option<Handler> {
    match filter.r#type {
        HTTPRouteRulesFiltersType::RequestHeaderModifier => {
            let modifier = filter.request_header_modifier.as_ref()?;
            Some(Handler::Headers(HeadersHandler {
                request: Some(header_ops(
                    modifier.add.iter().flatten().map(|h| (h.name.clone(), h.value.clone())),
                    modifier.set.iter().flatten().map(|h| (h.name.clone(), h.value.clone())),
                    modifier.remove.clone().unwrap_or_default(),
                )),
                response: None,
            }))
        }
        HTTPRouteRulesFiltersType::ResponseHeaderModifier => {
            let modifier = filter.response_header_modifier.as_ref()?;
            Some(Handler::Headers(HeadersHandler {
                request: None,
                response: Some(RespHeaderOps {
                    ops: header_ops(
                        modifier.add.iter().flatten().map(|h| (h.name.clone(), h.value.clone())),
                        modifier.set.iter().flatten().map(|h| (h.name.clone(), h.value.clone())),
                        modifier.remove.clone().unwrap_or_default(),
                    ),
                    ..Default::default()
                }),
            }))
        }
        HTTPRouteRulesFiltersType::RequestRedirect => {
            let redirect = filter.request_redirect.as_ref()?;

            // The port, if not explicitly set, is inferred from the scheme
            // or the listener.
            let mut port = redirect.port.unwrap_or_default();
            let scheme = match &redirect.scheme {
                Some(HTTPRouteRulesFiltersRequestRedirectScheme::Http) => {
                    if port == 0 {
                        port = 80;
                    }
                    "http".to_string()
                }
                Some(HTTPRouteRulesFiltersRequestRedirectScheme::Https) => {
                    if port == 0 {
                        port = 443;
                    }
                    "https".to_string()
                }
                None => {
                    // Keep the scheme the same via a Caddy placeholder; the
                    // redirect port falls back to the listener port.
                    if port == 0 {
                        port = listener.port;
                    }
                    "{http.request.scheme}".to_string()
                }
            };

            let hostname = redirect
                .hostname
                .clone()
                .unwrap_or_else(|| "{http.request.host}".to_string());

            let mut location = format!("{scheme}://{hostname}");
            // Well-known scheme/port pairs are omitted from the Location.
            let well_known = (scheme == "http" && port == 80) || (scheme == "https" && port == 443);
            if !well_known {
                location.push(':');
                location.push_str(&port.to_string());
            }

            match &redirect.path {
                Some(path) => match path.r#type {
                    HTTPRouteRulesFiltersRequestRedirectPathType::ReplaceFullPath => {
                        if let Some(replacement) = &path.replace_full_path {
                            if !replacement.starts_with('/') {
                                location.push('/');
                            }
                            location.push_str(replacement);
                        }
                    }
                    HTTPRouteRulesFiltersRequestRedirectPathType::ReplacePrefixMatch => {
                        // Prefix replacement on redirects is not compiled.
                    }
                },
                None => {
                    // Keep the path the same via a Caddy placeholder.
                    location.push_str("{http.request.uri}");
                }
            }

            let status_code = redirect.status_code.unwrap_or(302);
            *terminal = true;
            Some(Handler::StaticResponse(StaticResponse {
                status_code: Some(status_code.to_string().into()),
                headers: {
                    let mut headers = caddy_config::http::Headers::new();
                    headers.insert("Location".to_string(), vec![location]);
                    headers
                },
                ..Default::default()
            }))
        }
        HTTPRouteRulesFiltersType::UrlRewrite => {
            let rewrite = filter.url_rewrite.as_ref()?;
            let mut handler = Rewrite::default();
            if rewrite.hostname.is_some() {
                warn!("URLRewrite hostname replacement is not supported");
            }
            if let Some(path) = &rewrite.path {
                match path.r#type {
                    HTTPRouteRulesFiltersUrlRewritePathType::ReplaceFullPath => {
                        if let Some(replacement) = &path.replace_full_path {
                            handler.uri = replacement.clone();
                        }
                    }
                    HTTPRouteRulesFiltersUrlRewritePathType::ReplacePrefixMatch => {
                        let replacement = path.replace_prefix_match.as_deref().unwrap_or_default();
                        // A `/` replacement with a prefix matcher present is
                        // Caddy's strip_path_prefix.
                        if replacement == "/" && !matcher.path.is_empty() {
                            handler.strip_path_prefix =
                                matcher.path[0].trim_end_matches('*').to_string();
                        } else {
                            warn!(
                                replacement = %replacement,
                                "URLRewrite prefix replacement other than \"/\" is not supported",
                            );
                        }
                    }
                }
            }
            Some(Handler::Rewrite(handler))
        }
        // Request mirroring needs a Caddy module that does not exist yet;
        // CORS and extension filters are implementation-specific. All three
        // are recognized and skipped.
        HTTPRouteRulesFiltersType::RequestMirror
        | HTTPRouteRulesFiltersType::ExtensionRef => None,
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn header_ops(
    add: impl Iterator<Item = (String, String)>,
    set: impl Iterator<Item = (String, String)>,
    delete: Vec<String>,
) -> HeaderOps {
    let mut ops = HeaderOps {
        delete,
        ..Default::default()
    };
    for (name, value) in add {
        ops.add.entry(name).or_default().push(value);
    }
    for (name, value) in set {
        ops.set.entry(name).or_default().push(value);
    }
    ops
}
