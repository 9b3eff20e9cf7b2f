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

//! End-to-end synthesis scenarios: Gateway API objects in, Caddy JSON out.

use controlplane::backend_tls_policy::BackendTLSPolicy;
use controlplane::caddy::Input;
use gateway_api::apis::experimental::tcproutes::TCPRoute;
use gateway_api::apis::experimental::tlsroutes::TLSRoute;
use gateway_api::apis::experimental::udproutes::UDPRoute;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::experimental::grpcroutes::GRPCRoute;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use serde_json::{json, Value};

const CONTROLLER_NAME: &str = "caddyserver.com/gateway-controller";

fn gateway(listeners: Value) -> Gateway {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "metadata": {"name": "test", "namespace": "default"},
        "spec": {"gatewayClassName": "caddy", "listeners": listeners},
    }))
    .expect("valid gateway fixture")
}

// A recorded parent status binding a route to the test Gateway under our
// controller.
fn attached_status() -> Value {
    json!({
        "parents": [{
            "parentRef": {"name": "test"},
            "controllerName": CONTROLLER_NAME,
            "conditions": [{
                "type": "Accepted",
                "status": "True",
                "reason": "Accepted",
                "message": "",
                "lastTransitionTime": "2024-01-01T00:00:00Z",
            }],
        }],
    })
}

fn http_route(namespace: &str, spec: Value) -> HTTPRoute {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "HTTPRoute",
        "metadata": {"name": "route", "namespace": namespace},
        "spec": spec,
        "status": attached_status(),
    }))
    .expect("valid http route fixture")
}

fn tls_route(namespace: &str, spec: Value) -> TLSRoute {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1alpha2",
        "kind": "TLSRoute",
        "metadata": {"name": "route", "namespace": namespace},
        "spec": spec,
        "status": attached_status(),
    }))
    .expect("valid tls route fixture")
}

fn udp_route(namespace: &str, spec: Value) -> UDPRoute {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1alpha2",
        "kind": "UDPRoute",
        "metadata": {"name": "route", "namespace": namespace},
        "spec": spec,
        "status": attached_status(),
    }))
    .expect("valid udp route fixture")
}

fn service(namespace: &str, name: &str, cluster_ip: &str, port: i32) -> Service {
    serde_json::from_value(json!({
        "metadata": {"name": name, "namespace": namespace},
        "spec": {"clusterIP": cluster_ip, "ports": [{"port": port}]},
    }))
    .expect("valid service fixture")
}

struct Fixtures {
    gateway: Gateway,
    http_routes: Vec<HTTPRoute>,
    grpc_routes: Vec<GRPCRoute>,
    tcp_routes: Vec<TCPRoute>,
    tls_routes: Vec<TLSRoute>,
    udp_routes: Vec<UDPRoute>,
    grants: Vec<ReferenceGrant>,
    backend_tls_policies: Vec<BackendTLSPolicy>,
    services: Vec<Service>,
    secrets: Vec<Secret>,
    config_maps: Vec<ConfigMap>,
}

impl Fixtures {
    fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            http_routes: vec![],
            grpc_routes: vec![],
            tcp_routes: vec![],
            tls_routes: vec![],
            udp_routes: vec![],
            grants: vec![],
            backend_tls_policies: vec![],
            services: vec![],
            secrets: vec![],
            config_maps: vec![],
        }
    }

    fn config(&self) -> Value {
        let input = Input {
            gateway: &self.gateway,
            http_routes: self.http_routes.as_slice(),
            grpc_routes: self.grpc_routes.as_slice(),
            tcp_routes: self.tcp_routes.as_slice(),
            tls_routes: self.tls_routes.as_slice(),
            udp_routes: self.udp_routes.as_slice(),
            grants: self.grants.as_slice(),
            backend_tls_policies: self.backend_tls_policies.as_slice(),
            services: self.services.as_slice(),
            secrets: self.secrets.as_slice(),
            config_maps: self.config_maps.as_slice(),
        };
        let raw = input.config().expect("synthesis succeeds");
        serde_json::from_slice(&raw).expect("synthesized config is valid JSON")
    }

    fn raw_config(&self) -> Vec<u8> {
        let input = Input {
            gateway: &self.gateway,
            http_routes: self.http_routes.as_slice(),
            grpc_routes: self.grpc_routes.as_slice(),
            tcp_routes: self.tcp_routes.as_slice(),
            tls_routes: self.tls_routes.as_slice(),
            udp_routes: self.udp_routes.as_slice(),
            grants: self.grants.as_slice(),
            backend_tls_policies: self.backend_tls_policies.as_slice(),
            services: self.services.as_slice(),
            secrets: self.secrets.as_slice(),
            config_maps: self.config_maps.as_slice(),
        };
        input.config().expect("synthesis succeeds")
    }

    fn udp_route_fixture(&mut self) {
        self.udp_routes.push(udp_route(
            "default",
            json!({
                "parentRefs": [{"name": "test"}],
                "rules": [{"backendRefs": [{"name": "dns", "port": 53}]}],
            }),
        ));
        self.services.push(service("default", "dns", "10.0.0.3", 53));
    }
}

#[test]
fn plain_http_gateway() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "http", "port": 80, "protocol": "HTTP"},
    ])));
    fixtures.http_routes.push(http_route(
        "default",
        json!({
            "parentRefs": [{"name": "test"}],
            "rules": [{
                "matches": [{"path": {"type": "PathPrefix", "value": "/api"}}],
                "backendRefs": [{"name": "svc", "port": 8080}],
            }],
        }),
    ));
    fixtures.services.push(service("default", "svc", "10.0.0.1", 8080));

    let config = fixtures.config();
    assert_eq!(config["admin"]["listen"], ":2019");

    let server = &config["apps"]["http"]["servers"]["80"];
    assert_eq!(server["listen"], json!([":80"]));
    assert_eq!(server["automatic_https"]["disable"], json!(true));

    let routes = server["routes"].as_array().expect("server routes");
    assert_eq!(routes.len(), 2);

    // The route compiles to a subroute carrying the path matcher and the
    // proxy handler.
    let subroute = &routes[0]["handle"][0];
    assert_eq!(subroute["handler"], "subroute");
    let rule_route = &subroute["routes"][0];
    assert_eq!(rule_route["match"][0]["path"], json!(["/api*"]));
    let proxy = &rule_route["handle"][0];
    assert_eq!(proxy["handler"], "reverse_proxy");
    assert_eq!(proxy["upstreams"][0]["dial"], "10.0.0.1:8080");

    // Followed by the terminal catch-all.
    let catch_all = &routes[1];
    assert_eq!(catch_all["terminal"], json!(true));
    assert_eq!(catch_all["handle"][0]["handler"], "static_response");
    assert_eq!(catch_all["handle"][0]["status_code"], "421");
    assert_eq!(catch_all["handle"][0]["body"], "unable to route request\n");
}

#[test]
fn https_termination_loads_certificates() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {
            "name": "https",
            "port": 443,
            "protocol": "HTTPS",
            "hostname": "api.example.com",
            "tls": {"mode": "Terminate", "certificateRefs": [{"name": "api-tls"}]},
        },
    ])));
    fixtures.http_routes.push(http_route(
        "default",
        json!({
            "parentRefs": [{"name": "test"}],
            "hostnames": ["api.example.com"],
            "rules": [{"backendRefs": [{"name": "svc", "port": 8443}]}],
        }),
    ));
    fixtures.services.push(service("default", "svc", "10.0.0.4", 8443));
    fixtures.secrets.push(
        serde_json::from_value(json!({
            "metadata": {"name": "api-tls", "namespace": "default"},
            // base64 of "CERTPEM" / "KEYPEM"
            "data": {"tls.crt": "Q0VSVFBFTQ==", "tls.key": "S0VZUEVN"},
        }))
        .expect("valid secret fixture"),
    );

    let config = fixtures.config();

    let pem = &config["apps"]["tls"]["certificates"]["load_pem"][0];
    assert_eq!(pem["certificate"], "CERTPEM");
    assert_eq!(pem["key"], "KEYPEM");
    assert_eq!(config["apps"]["tls"]["disable_ocsp_stapling"], json!(true));

    let server = &config["apps"]["http"]["servers"]["443"];
    assert_eq!(
        server["tls_connection_policies"][0]["match"]["sni"],
        json!(["api.example.com"]),
    );
    assert_eq!(server["routes"][0]["match"][0]["host"], json!(["api.example.com"]));
}

#[test]
fn redirect_to_https_omits_well_known_port() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "http", "port": 80, "protocol": "HTTP"},
    ])));
    fixtures.http_routes.push(http_route(
        "default",
        json!({
            "parentRefs": [{"name": "test"}],
            "rules": [{
                "filters": [{"type": "RequestRedirect", "requestRedirect": {"scheme": "https"}}],
            }],
        }),
    ));

    let config = fixtures.config();
    let route = &config["apps"]["http"]["servers"]["80"]["routes"][0];
    assert_eq!(route["terminal"], json!(true));

    let redirect = &route["handle"][0];
    assert_eq!(redirect["handler"], "static_response");
    assert_eq!(redirect["status_code"], "302");
    assert_eq!(
        redirect["headers"]["Location"],
        json!(["https://{http.request.host}{http.request.uri}"]),
    );
}

#[test]
fn redirect_with_explicit_port_keeps_it() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "http", "port": 80, "protocol": "HTTP"},
    ])));
    fixtures.http_routes.push(http_route(
        "default",
        json!({
            "parentRefs": [{"name": "test"}],
            "rules": [{
                "filters": [{
                    "type": "RequestRedirect",
                    "requestRedirect": {"scheme": "https", "port": 8443},
                }],
            }],
        }),
    ));

    let config = fixtures.config();
    let redirect = &config["apps"]["http"]["servers"]["80"]["routes"][0]["handle"][0];
    assert_eq!(
        redirect["headers"]["Location"],
        json!(["https://{http.request.host}:8443{http.request.uri}"]),
    );
}

#[test]
fn tls_passthrough_routes_by_sni() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {
            "name": "tls",
            "port": 443,
            "protocol": "TLS",
            "hostname": "*.example.com",
            "tls": {"mode": "Passthrough"},
        },
    ])));
    fixtures.tls_routes.push(tls_route(
        "default",
        json!({
            "parentRefs": [{"name": "test"}],
            "hostnames": ["api.example.com"],
            "rules": [{"backendRefs": [{"name": "svc", "port": 6443}]}],
        }),
    ));
    fixtures.services.push(service("default", "svc", "10.0.0.2", 6443));

    let config = fixtures.config();

    let server = &config["apps"]["layer4"]["servers"]["tls/443"];
    let route = &server["routes"][0];
    assert_eq!(route["match"][0]["tls"]["sni"], json!(["api.example.com"]));

    // Passthrough: a single proxy handler, no TLS termination.
    let handlers = route["handle"].as_array().expect("route handlers");
    assert_eq!(handlers.len(), 1);
    assert_eq!(handlers[0]["handler"], "proxy");
    assert_eq!(handlers[0]["upstreams"][0]["dial"], json!(["10.0.0.2:6443"]));

    // No certificates were loaded.
    assert!(config["apps"].get("tls").is_none());
}

#[test]
fn udp_upstreams_are_prefixed() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "dns", "port": 53, "protocol": "UDP"},
    ])));
    fixtures.udp_route_fixture();

    let config = fixtures.config();
    let server = &config["apps"]["layer4"]["servers"]["udp/53"];
    assert_eq!(server["listen"], json!(["udp/:53"]));
    assert_eq!(
        server["routes"][0]["handle"][0]["upstreams"][0]["dial"],
        json!(["udp/10.0.0.3:53"]),
    );
}

#[test]
fn cross_namespace_backend_requires_grant() {
    let make = |grants: Vec<ReferenceGrant>| {
        let mut fixtures = Fixtures::new(gateway(json!([
            {"name": "http", "port": 80, "protocol": "HTTP",
             "allowedRoutes": {"namespaces": {"from": "All"}}},
        ])));
        fixtures.http_routes.push(
            serde_json::from_value(json!({
                "apiVersion": "gateway.networking.k8s.io/v1",
                "kind": "HTTPRoute",
                "metadata": {"name": "route", "namespace": "app"},
                "spec": {
                    "parentRefs": [{"name": "test", "namespace": "default"}],
                    "rules": [{
                        "backendRefs": [{"name": "svc", "namespace": "backend", "port": 8080}],
                    }],
                },
                "status": {
                    "parents": [{
                        "parentRef": {"name": "test", "namespace": "default"},
                        "controllerName": CONTROLLER_NAME,
                        "conditions": [{
                            "type": "Accepted",
                            "status": "True",
                            "reason": "Accepted",
                            "message": "",
                            "lastTransitionTime": "2024-01-01T00:00:00Z",
                        }],
                    }],
                },
            }))
            .expect("valid http route fixture"),
        );
        fixtures.services.push(service("backend", "svc", "10.0.0.9", 8080));
        fixtures.grants = grants;
        fixtures
    };

    let grant: ReferenceGrant = serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1beta1",
        "kind": "ReferenceGrant",
        "metadata": {"name": "allow-app", "namespace": "backend"},
        "spec": {
            "from": [{
                "group": "gateway.networking.k8s.io",
                "kind": "HTTPRoute",
                "namespace": "app",
            }],
            "to": [{"group": "", "kind": "Service"}],
        },
    }))
    .expect("valid grant fixture");

    let with_grant = serde_json::to_string(&make(vec![grant]).config()).unwrap();
    assert!(with_grant.contains("10.0.0.9:8080"));

    let without_grant = serde_json::to_string(&make(vec![]).config()).unwrap();
    assert!(!without_grant.contains("10.0.0.9:8080"));
}

#[test]
fn listeners_without_routes_still_get_servers() {
    let fixtures = Fixtures::new(gateway(json!([
        {"name": "http", "port": 80, "protocol": "HTTP"},
        {"name": "https", "port": 443, "protocol": "HTTPS", "hostname": "api.example.com"},
    ])));

    let config = fixtures.config();
    for key in ["80", "443"] {
        let routes = config["apps"]["http"]["servers"][key]["routes"]
            .as_array()
            .expect("server routes");
        // Only the catch-all 421 route.
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0]["handle"][0]["status_code"], "421");
    }
}

#[test]
fn gateway_without_listeners_produces_no_apps() {
    let fixtures = Fixtures::new(gateway(json!([])));
    let config = fixtures.config();
    assert_eq!(config["admin"]["listen"], ":2019");
    assert!(config["apps"].get("http").is_none());
    assert!(config["apps"].get("tls").is_none());
    assert!(config["apps"].get("layer4").is_none());
}

#[test]
fn duplicate_protocol_port_listeners_collapse() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "a", "port": 80, "protocol": "HTTP", "hostname": "a.example.com"},
        {"name": "b", "port": 80, "protocol": "HTTP", "hostname": "b.example.com"},
    ])));
    fixtures.http_routes.push(http_route(
        "default",
        json!({
            "parentRefs": [{"name": "test"}],
            "hostnames": ["a.example.com"],
            "rules": [{"backendRefs": [{"name": "svc", "port": 8080}]}],
        }),
    ));
    fixtures.services.push(service("default", "svc", "10.0.0.1", 8080));

    let config = fixtures.config();
    let servers = config["apps"]["http"]["servers"]
        .as_object()
        .expect("servers map");
    assert_eq!(servers.len(), 1);
    assert!(servers.contains_key("80"));
}

#[test]
fn synthesis_is_deterministic() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "http", "port": 80, "protocol": "HTTP"},
        {"name": "dns", "port": 53, "protocol": "UDP"},
    ])));
    fixtures.http_routes.push(http_route(
        "default",
        json!({
            "parentRefs": [{"name": "test"}],
            "rules": [{
                "matches": [{"path": {"type": "PathPrefix", "value": "/api"}}],
                "backendRefs": [{"name": "svc", "port": 8080}],
            }],
        }),
    ));
    fixtures.services.push(service("default", "svc", "10.0.0.1", 8080));
    fixtures.udp_route_fixture();

    let raw = fixtures.raw_config();
    assert_eq!(raw, fixtures.raw_config());

    // The emitted bytes always round-trip through the typed model.
    let parsed: caddy_config::Config = serde_json::from_slice(&raw).expect("valid CaddyConfig");
    assert_eq!(parsed.admin.as_ref().map(|a| a.listen.as_str()), Some(":2019"));
}

#[test]
fn unattached_routes_leave_no_trace() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "http", "port": 80, "protocol": "HTTP"},
    ])));
    // A route whose parent status names a different gateway.
    fixtures.http_routes.push(
        serde_json::from_value(json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "HTTPRoute",
            "metadata": {"name": "route", "namespace": "default"},
            "spec": {
                "parentRefs": [{"name": "other"}],
                "rules": [{"backendRefs": [{"name": "svc", "port": 8080}]}],
            },
            "status": {
                "parents": [{
                    "parentRef": {"name": "other"},
                    "controllerName": CONTROLLER_NAME,
                    "conditions": [{
                        "type": "Accepted",
                        "status": "True",
                        "reason": "Accepted",
                        "message": "",
                        "lastTransitionTime": "2024-01-01T00:00:00Z",
                    }],
                }],
            },
        }))
        .expect("valid http route fixture"),
    );
    fixtures.services.push(service("default", "svc", "10.0.0.1", 8080));

    let raw = String::from_utf8(fixtures.raw_config()).unwrap();
    assert!(!raw.contains("10.0.0.1:8080"));
}

#[test]
fn section_name_constrains_attachment() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "web", "port": 80, "protocol": "HTTP"},
        {"name": "alt", "port": 8080, "protocol": "HTTP"},
    ])));
    // Bound to the `alt` listener only.
    fixtures.http_routes.push(
        serde_json::from_value(json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "HTTPRoute",
            "metadata": {"name": "route", "namespace": "default"},
            "spec": {
                "parentRefs": [{"name": "test", "sectionName": "alt"}],
                "rules": [{"backendRefs": [{"name": "svc", "port": 8080}]}],
            },
            "status": {
                "parents": [{
                    "parentRef": {"name": "test", "sectionName": "alt"},
                    "controllerName": CONTROLLER_NAME,
                    "conditions": [{
                        "type": "Accepted",
                        "status": "True",
                        "reason": "Accepted",
                        "message": "",
                        "lastTransitionTime": "2024-01-01T00:00:00Z",
                    }],
                }],
            },
        }))
        .expect("valid http route fixture"),
    );
    fixtures.services.push(service("default", "svc", "10.0.0.1", 8080));

    let config = fixtures.config();
    let web_routes = config["apps"]["http"]["servers"]["80"]["routes"]
        .as_array()
        .expect("routes");
    // Catch-all only on the unselected listener.
    assert_eq!(web_routes.len(), 1);

    let alt_routes = config["apps"]["http"]["servers"]["8080"]["routes"]
        .as_array()
        .expect("routes");
    assert_eq!(alt_routes.len(), 2);
}

#[test]
fn h2c_app_protocol_sets_transport_versions() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "http", "port": 80, "protocol": "HTTP"},
    ])));
    fixtures.http_routes.push(http_route(
        "default",
        json!({
            "parentRefs": [{"name": "test"}],
            "rules": [{"backendRefs": [{"name": "grpc", "port": 50051}]}],
        }),
    ));
    fixtures.services.push(
        serde_json::from_value(json!({
            "metadata": {"name": "grpc", "namespace": "default"},
            "spec": {
                "clusterIP": "10.0.0.5",
                "ports": [{"port": 50051, "appProtocol": "kubernetes.io/h2c"}],
            },
        }))
        .expect("valid service fixture"),
    );

    let config = fixtures.config();
    let proxy = &config["apps"]["http"]["servers"]["80"]["routes"][0]["handle"][0];
    assert_eq!(proxy["handler"], "reverse_proxy");
    assert_eq!(proxy["transport"]["protocol"], "http");
    assert_eq!(proxy["transport"]["versions"], json!(["h2c"]));
}

#[test]
fn backend_tls_policy_configures_upstream_tls() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "http", "port": 80, "protocol": "HTTP"},
    ])));
    fixtures.http_routes.push(http_route(
        "default",
        json!({
            "parentRefs": [{"name": "test"}],
            "rules": [{"backendRefs": [{"name": "svc", "port": 8443}]}],
        }),
    ));
    fixtures.services.push(service("default", "svc", "10.0.0.6", 8443));
    fixtures.backend_tls_policies.push(
        serde_json::from_value(json!({
            "apiVersion": "gateway.networking.k8s.io/v1alpha3",
            "kind": "BackendTLSPolicy",
            "metadata": {"name": "svc-tls", "namespace": "default"},
            "spec": {
                "targetRefs": [{"group": "", "kind": "Service", "name": "svc"}],
                "validation": {
                    "hostname": "svc.internal",
                    "caCertificateRefs": [{"group": "", "kind": "ConfigMap", "name": "ca"}],
                },
            },
        }))
        .expect("valid policy fixture"),
    );
    fixtures.config_maps.push(
        serde_json::from_value(json!({
            "metadata": {"name": "ca", "namespace": "default"},
            "data": {
                "ca.crt": "-----BEGIN CERTIFICATE-----\nMIIBszCC\naGVsbG8=\n-----END CERTIFICATE-----\n",
            },
        }))
        .expect("valid configmap fixture"),
    );

    let config = fixtures.config();
    let tls = &config["apps"]["http"]["servers"]["80"]["routes"][0]["handle"][0]["transport"]["tls"];
    assert_eq!(tls["server_name"], "svc.internal");
    assert_eq!(tls["ca"]["provider"], "inline");
    assert_eq!(tls["ca"]["trusted_ca_certs"], json!(["MIIBszCCaGVsbG8="]));
}

#[test]
fn strip_prefix_rewrite_uses_the_path_matcher() {
    let mut fixtures = Fixtures::new(gateway(json!([
        {"name": "http", "port": 80, "protocol": "HTTP"},
    ])));
    fixtures.http_routes.push(http_route(
        "default",
        json!({
            "parentRefs": [{"name": "test"}],
            "rules": [{
                "matches": [{"path": {"type": "PathPrefix", "value": "/api"}}],
                "filters": [{
                    "type": "URLRewrite",
                    "urlRewrite": {"path": {"type": "ReplacePrefixMatch", "replacePrefixMatch": "/"}},
                }],
                "backendRefs": [{"name": "svc", "port": 8080}],
            }],
        }),
    ));
    fixtures.services.push(service("default", "svc", "10.0.0.1", 8080));

    let config = fixtures.config();
    let rule_route = &config["apps"]["http"]["servers"]["80"]["routes"][0]["handle"][0]["routes"][0];
    let rewrite = &rule_route["handle"][0];
    assert_eq!(rewrite["handler"], "rewrite");
    assert_eq!(rewrite["strip_path_prefix"], "/api");
}
