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

//! Attachment rules, hostname intersection, and Gateway status helpers.

use std::collections::BTreeMap;

use chrono::Utc;
use gateway_api::apis::standard::constants::{GatewayConditionReason, GatewayConditionType};
use gateway_api::apis::standard::gateways::{
    Gateway, GatewayListeners, GatewayListenersAllowedRoutesNamespacesFrom, GatewayStatus,
    GatewayStatusAddresses,
};
use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::api::{Api, Patch, PatchParams};
use serde_json::json;

use crate::consts::{FIELD_MANAGER, GATEWAY_CLASS_CONTROLLER_NAME, ROUTE_CONDITION_ACCEPTED, ROUTE_CONDITION_RESOLVED_REFS};
use crate::route_utils::set_condition;
use crate::routes::RouteInfo;
use crate::{Error, Result};

// Checks if the given string matches the name of our gateway controller. We
// accept sub-paths so major API changes stay backwards compatible.
pub fn matches_controller_name(v: &str) -> bool {
    v.starts_with(GATEWAY_CLASS_CONTROLLER_NAME)
}

// Dereferences the given namespace if present and non-empty, otherwise
// returns the provided default.
pub fn namespace_deref_or(ns: Option<&String>, default_namespace: &str) -> String {
    match ns {
        Some(ns) if !ns.is_empty() => ns.clone(),
        _ => default_namespace.to_string(),
    }
}

// Returns the intersecting hostnames between the route and every listener on
// the Gateway.
pub fn compute_hosts(gateway: &Gateway, hostnames: &[String]) -> Vec<String> {
    let mut hosts = Vec::new();
    for listener in &gateway.spec.listeners {
        hosts.extend(compute_hosts_for_listener(
            listener.hostname.as_ref(),
            hostnames,
        ));
    }
    hosts
}

// Returns a sorted list of the intersecting hostnames between a route and a
// listener.
pub fn compute_hosts_for_listener(
    listener_hostname: Option<&String>,
    route_hostnames: &[String],
) -> Vec<String> {
    let listener_hostname = listener_hostname.map(String::as_str).unwrap_or_default();

    // No route hostnames specified: use the listener hostname if specified,
    // or else match all hostnames.
    if route_hostnames.is_empty() {
        if !listener_hostname.is_empty() {
            return vec![listener_hostname.to_string()];
        }
        return vec!["*".to_string()];
    }

    let mut hostnames = Vec::new();
    for route_hostname in route_hostnames {
        if listener_hostname.is_empty() || listener_hostname == route_hostname {
            hostnames.push(route_hostname.clone());
        } else if listener_hostname.starts_with('*') {
            if hostname_matches_wildcard_hostname(route_hostname, listener_hostname) {
                hostnames.push(route_hostname.clone());
            }
        } else if route_hostname.starts_with('*')
            && hostname_matches_wildcard_hostname(listener_hostname, route_hostname)
        {
            hostnames.push(listener_hostname.to_string());
        }
    }

    hostnames.sort();
    hostnames
}

// Returns true if hostname has the non-wildcard portion of wildcardHostname
// as a suffix, plus at least one DNS label matching the wildcard.
fn hostname_matches_wildcard_hostname(hostname: &str, wildcard_hostname: &str) -> bool {
    let trimmed = wildcard_hostname.trim_start_matches('*');
    let Some(wildcard_match) = hostname.strip_suffix(trimmed) else {
        return false;
    };
    !wildcard_match.is_empty()
}

// A route may attach when a recorded parent under our controller reports
// Accepted=True, or reports ResolvedRefs=False. The second clause keeps
// otherwise-accepted routes with backend problems attached so they continue
// to receive status updates.
pub fn has_attachable_condition(conditions: &[metav1::Condition]) -> bool {
    conditions.iter().any(|cond| {
        (cond.type_ == ROUTE_CONDITION_ACCEPTED && cond.status == "True")
            || (cond.type_ == ROUTE_CONDITION_RESOLVED_REFS && cond.status == "False")
    })
}

// Returns true if the route records an attachable parent status for this
// Gateway.
pub fn is_attachable<R: RouteInfo>(gateway: &Gateway, route: &R) -> bool {
    let route_namespace = route.metadata().namespace.clone().unwrap_or_default();
    let gateway_namespace = gateway.metadata.namespace.clone().unwrap_or_default();
    let gateway_name = gateway.metadata.name.clone().unwrap_or_default();

    route.parent_statuses().iter().any(|parent| {
        matches_controller_name(&parent.controller_name)
            && namespace_deref_or(parent.parent_ref.namespace.as_ref(), &route_namespace)
                == gateway_namespace
            && parent.parent_ref.name == gateway_name
            && has_attachable_condition(&parent.conditions)
    })
}

// Returns true if the provided route is allowed to attach to the given
// Gateway according to its listeners' allowedRoutes.
pub fn is_allowed(
    gateway: &Gateway,
    route_kind: &str,
    route_namespace: &str,
    namespace: Option<&Namespace>,
) -> bool {
    let gateway_namespace = gateway.metadata.namespace.as_deref().unwrap_or_default();
    for listener in &gateway.spec.listeners {
        // All routes in the same namespace are allowed for this listener.
        let Some(namespaces) = listener
            .allowed_routes
            .as_ref()
            .and_then(|ar| ar.namespaces.as_ref())
        else {
            return route_namespace == gateway_namespace;
        };

        if !is_kind_allowed(listener, route_kind) {
            continue;
        }

        match namespaces.from {
            Some(GatewayListenersAllowedRoutesNamespacesFrom::All) => return true,
            Some(GatewayListenersAllowedRoutesNamespacesFrom::Same) | None => {
                if route_namespace == gateway_namespace {
                    return true;
                }
            }
            Some(GatewayListenersAllowedRoutesNamespacesFrom::Selector) => {
                let Some(selector) = namespaces.selector.as_ref() else {
                    continue;
                };
                let labels = namespace
                    .and_then(|ns| ns.metadata.labels.clone())
                    .unwrap_or_default();
                if selector_matches_labels(
                    selector.match_labels.as_ref(),
                    selector.match_expressions.as_deref(),
                    &labels,
                ) {
                    return true;
                }
            }
        }
    }
    false
}

// Returns true if the listener's allowedRoutes.kinds admits the route kind.
pub fn is_kind_allowed(listener: &GatewayListeners, route_kind: &str) -> bool {
    let Some(kinds) = listener
        .allowed_routes
        .as_ref()
        .and_then(|ar| ar.kinds.as_ref())
    else {
        return true;
    };
    if kinds.is_empty() {
        return true;
    }
    kinds.iter().any(|k| k.kind == route_kind)
}

fn selector_matches_labels(
    match_labels: Option<&BTreeMap<String, String>>,
    match_expressions: Option<&[gateway_api::apis::standard::gateways::GatewayListenersAllowedRoutesNamespacesSelectorMatchExpressions]>,
    labels: &BTreeMap<String, String>,
) -> bool {
    if let Some(match_labels) = match_labels {
        for (key, value) in match_labels {
            if labels.get(key) != Some(value) {
                return false;
            }
        }
    }
    if let Some(expressions) = match_expressions {
        for expr in expressions {
            let value = labels.get(&expr.key);
            let values = expr.values.clone().unwrap_or_default();
            let ok = match expr.operator.as_str() {
                "In" => value.is_some_and(|v| values.contains(v)),
                "NotIn" => value.is_none_or(|v| !values.contains(v)),
                "Exists" => value.is_some(),
                "DoesNotExist" => value.is_none(),
                _ => false,
            };
            if !ok {
                return false;
            }
        }
    }
    true
}

// Filters the provided routes down to the ones attached to this Gateway.
// When require_hostnames is set, routes whose hostnames do not intersect any
// listener are dropped as well (used for SNI-routed kinds).
pub fn filter_attached<R: RouteInfo + Clone>(
    gateway: &Gateway,
    routes: &[R],
    namespaces: &BTreeMap<String, Namespace>,
    require_hostnames: bool,
) -> Vec<R> {
    routes
        .iter()
        .filter(|route| {
            let route_namespace = route.metadata().namespace.clone().unwrap_or_default();
            if !is_attachable(gateway, *route) {
                return false;
            }
            if !is_allowed(
                gateway,
                route.route_kind().as_str(),
                &route_namespace,
                namespaces.get(&route_namespace),
            ) {
                return false;
            }
            if require_hostnames && compute_hosts(gateway, &route.hostnames()).is_empty() {
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

// Sets the provided condition on the Gateway, stamping time and generation.
pub fn set_gateway_condition(gateway: &mut Gateway, type_: GatewayConditionType, status: &str, reason: GatewayConditionReason, message: &str) {
    let condition = metav1::Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation: gateway.metadata.generation,
        last_transition_time: metav1::Time(Utc::now()),
    };
    set_condition(gateway, condition);
}

// Modifies the Gateway's status to reflect the LoadBalancer Service's
// ingress addresses.
pub fn set_gateway_status_addresses(gateway: &mut Gateway, service: &Service) {
    let mut addresses: Vec<GatewayStatusAddresses> = vec![];
    if let Some(ingress) = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
    {
        for entry in ingress {
            if let Some(ip) = &entry.ip {
                if !ip.is_empty() {
                    addresses.push(GatewayStatusAddresses {
                        r#type: Some("IPAddress".to_string()),
                        value: ip.clone(),
                    });
                }
            }
            if let Some(hostname) = &entry.hostname {
                if !hostname.is_empty() {
                    addresses.push(GatewayStatusAddresses {
                        r#type: Some("Hostname".to_string()),
                        value: hostname.clone(),
                    });
                }
            }
        }
    }
    gateway
        .status
        .get_or_insert_with(GatewayStatus::default)
        .addresses = Some(addresses);
}

// Patch the provided status on the Gateway object.
pub async fn patch_status(
    gateway_api: &Api<Gateway>,
    name: &str,
    status: &GatewayStatus,
) -> Result<()> {
    let empty = vec![];
    let conditions = status.conditions.as_ref().unwrap_or(&empty);
    let addresses_empty = vec![];
    let addresses = status.addresses.as_ref().unwrap_or(&addresses_empty);
    let patch = Patch::Apply(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "status": {
            "conditions": conditions,
            "addresses": addresses,
        }
    }));
    let params = PatchParams::apply(FIELD_MANAGER).force();
    gateway_api
        .patch_status(name, &params, &patch)
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(listener: Option<&str>, route: &[&str]) -> Vec<String> {
        let listener = listener.map(str::to_string);
        let route: Vec<String> = route.iter().map(|s| s.to_string()).collect();
        compute_hosts_for_listener(listener.as_ref(), &route)
    }

    #[test]
    fn no_route_hostnames_uses_listener_or_wildcard() {
        assert_eq!(hosts(Some("api.example.com"), &[]), vec!["api.example.com"]);
        assert_eq!(hosts(None, &[]), vec!["*"]);
        assert_eq!(hosts(Some(""), &[]), vec!["*"]);
    }

    #[test]
    fn listener_wildcard_matches_route_hostnames() {
        assert_eq!(
            hosts(Some("*.example.com"), &["api.example.com", "example.com", "a.b.example.com"]),
            vec!["a.b.example.com", "api.example.com"],
        );
    }

    #[test]
    fn route_wildcard_matches_listener_hostname() {
        assert_eq!(
            hosts(Some("api.example.com"), &["*.example.com"]),
            vec!["api.example.com"],
        );
        // The bare domain must not match its own wildcard.
        assert_eq!(hosts(Some("example.com"), &["*.example.com"]), Vec::<String>::new());
    }

    #[test]
    fn wildcard_intersection_is_commutative() {
        assert_eq!(
            hosts(Some("*.example.com"), &["api.example.com"]),
            hosts(Some("api.example.com"), &["*.example.com"]),
        );
    }

    #[test]
    fn intersection_is_idempotent_and_sorted() {
        let first = hosts(Some("*.example.com"), &["b.example.com", "a.example.com"]);
        assert_eq!(first, vec!["a.example.com", "b.example.com"]);
        let second = compute_hosts_for_listener(Some(&"*.example.com".to_string()), &first);
        assert_eq!(second, first);

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted);
    }

    #[test]
    fn controller_name_prefix_match() {
        assert!(matches_controller_name("caddyserver.com/gateway-controller"));
        assert!(matches_controller_name("caddyserver.com/gateway-controller/v2"));
        assert!(!matches_controller_name("example.com/other-controller"));
    }

    #[test]
    fn attachable_condition_accepts_resolved_refs_false() {
        let accepted = metav1::Condition {
            type_: "Accepted".into(),
            status: "True".into(),
            reason: "Accepted".into(),
            message: String::new(),
            observed_generation: None,
            last_transition_time: metav1::Time(Utc::now()),
        };
        assert!(has_attachable_condition(&[accepted.clone()]));

        let unresolved = metav1::Condition {
            type_: "ResolvedRefs".into(),
            status: "False".into(),
            reason: "BackendNotFound".into(),
            ..accepted.clone()
        };
        assert!(has_attachable_condition(&[unresolved]));

        let rejected = metav1::Condition {
            status: "False".into(),
            ..accepted
        };
        assert!(!has_attachable_condition(&[rejected]));
    }

    fn gateway_with_listeners(listeners: serde_json::Value) -> Gateway {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "Gateway",
            "metadata": {"name": "test", "namespace": "default"},
            "spec": {"gatewayClassName": "caddy", "listeners": listeners},
        }))
        .expect("valid gateway fixture")
    }

    #[test]
    fn nil_allowed_routes_only_allows_same_namespace() {
        let gw = gateway_with_listeners(serde_json::json!([
            {"name": "http", "port": 80, "protocol": "HTTP"},
        ]));
        assert!(is_allowed(&gw, "HTTPRoute", "default", None));
        assert!(!is_allowed(&gw, "HTTPRoute", "other", None));
    }

    #[test]
    fn from_all_allows_any_namespace() {
        let gw = gateway_with_listeners(serde_json::json!([
            {"name": "http", "port": 80, "protocol": "HTTP",
             "allowedRoutes": {"namespaces": {"from": "All"}}},
        ]));
        assert!(is_allowed(&gw, "HTTPRoute", "other", None));
    }

    #[test]
    fn from_selector_requires_matching_namespace_labels() {
        let gw = gateway_with_listeners(serde_json::json!([
            {"name": "http", "port": 80, "protocol": "HTTP",
             "allowedRoutes": {"namespaces": {
                 "from": "Selector",
                 "selector": {"matchLabels": {"team": "platform"}},
             }}},
        ]));
        let ns: Namespace = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "other", "labels": {"team": "platform"}},
        }))
        .expect("valid namespace fixture");
        assert!(is_allowed(&gw, "HTTPRoute", "other", Some(&ns)));

        let ns: Namespace = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "other", "labels": {"team": "web"}},
        }))
        .expect("valid namespace fixture");
        assert!(!is_allowed(&gw, "HTTPRoute", "other", Some(&ns)));
    }

    #[test]
    fn listener_kind_filter() {
        let gw = gateway_with_listeners(serde_json::json!([
            {"name": "http", "port": 80, "protocol": "HTTP",
             "allowedRoutes": {
                 "kinds": [{"kind": "HTTPRoute"}],
                 "namespaces": {"from": "All"},
             }},
        ]));
        assert!(is_allowed(&gw, "HTTPRoute", "other", None));
        assert!(!is_allowed(&gw, "TCPRoute", "other", None));
    }
}
