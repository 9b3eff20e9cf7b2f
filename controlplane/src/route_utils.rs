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

//! Route validation and condition bookkeeping shared by the per-kind route
//! reconcilers.

use chrono::Utc;
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use k8s_openapi::api::core::v1::{Namespace, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{Api, Client, Resource};
use serde_json::Value;
use tracing::debug;

use crate::consts::*;
use crate::gateway_utils::{compute_hosts, is_allowed, is_kind_allowed, matches_controller_name, namespace_deref_or};
use crate::reference_grants::is_backend_reference_allowed;
use crate::routes::{ParentRef, RouteInfo};
use crate::traits::HasConditions;
use crate::{Error, NamespaceName, Result};

// Sets the provided condition on any object implementing HasConditions. The
// condition is only rewritten when its status, reason, message, or observed
// generation changed; lastTransitionTime alone never causes an update.
pub fn set_condition<T: HasConditions>(obj: &mut T, new_cond: metav1::Condition) {
    merge_condition(obj.conditions_mut(), new_cond);
}

// Merges a condition into a condition list: find-by-type, update-if-changed,
// else append.
pub fn merge_condition(conditions: &mut Vec<metav1::Condition>, update: metav1::Condition) {
    for condition in conditions.iter_mut() {
        if condition.type_ == update.type_ {
            if condition_changed(condition, &update) {
                *condition = update;
            }
            return;
        }
    }
    conditions.push(update);
}

fn condition_changed(a: &metav1::Condition, b: &metav1::Condition) -> bool {
    a.status != b.status
        || a.reason != b.reason
        || a.message != b.message
        || a.observed_generation != b.observed_generation
}

// Builds a condition stamped with the current time; the observed generation
// is filled in by the per-route helpers.
pub fn new_condition(type_: &str, status: &str, reason: &str, message: &str) -> metav1::Condition {
    metav1::Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation: None,
        last_transition_time: metav1::Time(Utc::now()),
    }
}

// Sets a condition on the status block of a single parent.
pub fn set_parent_condition<R: RouteInfo>(
    route: &mut R,
    parent: &ParentRef,
    mut condition: metav1::Condition,
) {
    condition.observed_generation = route.metadata().generation;
    route.merge_parent_condition(parent, condition);
}

// Sets a condition on the status blocks of every parent.
pub fn set_all_parents_condition<R: RouteInfo>(route: &mut R, condition: metav1::Condition) {
    for parent in route.parent_refs() {
        set_parent_condition(route, &parent, condition.clone());
    }
}

// Returns true when the two serialized statuses are equal, ignoring
// lastTransitionTime everywhere. Used to decide whether a status patch is
// needed at all.
pub fn statuses_equal(old: &Value, new: &Value) -> bool {
    fn normalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(k, _)| k.as_str() != "lastTransitionTime")
                    .map(|(k, v)| (k.clone(), normalize(v)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
            other => other.clone(),
        }
    }
    normalize(old) == normalize(new)
}

// Everything a per-parent check needs to decide whether the route may attach
// to the Gateway referenced by `parent`.
pub struct ParentCheck<'a> {
    pub gateway: &'a Gateway,
    pub parent: &'a ParentRef,
    pub route_namespace: &'a str,
    // The route's Namespace object; only fetched when a listener uses a
    // namespace selector.
    pub namespace: Option<&'a Namespace>,
}

// Validates a route against its parent Gateways and its backends, mutating
// the route's status conditions in place. The caller patches the status if it
// changed.
pub async fn validate_route<R: RouteInfo>(
    client: &Client,
    route: &mut R,
    grants: &[ReferenceGrant],
) -> Result<()> {
    let route_namespace = route.metadata().namespace()?.to_string();

    for parent in route.parent_refs() {
        if !parent.is_gateway() {
            continue;
        }

        // Assume acceptance; the checks below overwrite it as needed.
        set_parent_condition(
            route,
            &parent,
            new_condition(
                ROUTE_CONDITION_ACCEPTED,
                "True",
                ROUTE_REASON_ACCEPTED,
                &format!("Accepted {}", route.route_kind()),
            ),
        );
        set_all_parents_condition(
            route,
            new_condition(
                ROUTE_CONDITION_RESOLVED_REFS,
                "True",
                ROUTE_REASON_RESOLVED_REFS,
                "Service reference is valid",
            ),
        );

        let gateway_namespace = namespace_deref_or(parent.namespace.as_ref(), &route_namespace);
        let gateway_api: Api<Gateway> = Api::namespaced(client.clone(), &gateway_namespace);
        let gateway = match gateway_api
            .get_opt(&parent.name)
            .await
            .map_err(Error::KubeError)?
        {
            Some(gw) => gw,
            None => {
                set_parent_condition(
                    route,
                    &parent,
                    new_condition(
                        ROUTE_CONDITION_ACCEPTED,
                        "False",
                        ROUTE_REASON_NO_MATCHING_PARENT,
                        &format!("Gateway {gateway_namespace}/{} does not exist", parent.name),
                    ),
                );
                continue;
            }
        };

        // Leave routes of foreign controllers alone.
        if !gateway_managed_by_us(client, &gateway).await? {
            debug!(
                gateway = %format!("{gateway_namespace}/{}", parent.name),
                "skipping parent managed by another controller",
            );
            continue;
        }

        let mut namespace_obj = None;
        if uses_namespace_selector(&gateway) {
            let ns_api: Api<Namespace> = Api::all(client.clone());
            namespace_obj = ns_api
                .get_opt(&route_namespace)
                .await
                .map_err(Error::KubeError)?;
        }
        let check = ParentCheck {
            gateway: &gateway,
            parent: &parent,
            route_namespace: &route_namespace,
            namespace: namespace_obj.as_ref(),
        };

        let checks: [fn(&mut R, &ParentCheck<'_>) -> bool; 5] = [
            check_gateway_allowed_for_namespace::<R>,
            check_gateway_route_kind_allowed::<R>,
            check_gateway_matching_ports::<R>,
            check_gateway_matching_hostnames::<R>,
            check_gateway_matching_section::<R>,
        ];
        for fun in checks {
            if !fun(route, &check) {
                break;
            }
        }
    }

    if !check_cross_namespace_backend_references(route, &route_namespace, grants) {
        return Ok(());
    }
    if !check_backend(route) {
        return Ok(());
    }
    check_backend_is_existing_service(client, route, &route_namespace).await?;

    Ok(())
}

async fn gateway_managed_by_us(client: &Client, gateway: &Gateway) -> Result<bool> {
    let class_api: Api<GatewayClass> = Api::all(client.clone());
    let class = class_api
        .get_opt(&gateway.spec.gateway_class_name)
        .await
        .map_err(Error::KubeError)?;
    Ok(class
        .map(|c| matches_controller_name(&c.spec.controller_name))
        .unwrap_or(false))
}

fn uses_namespace_selector(gateway: &Gateway) -> bool {
    gateway.spec.listeners.iter().any(|l| {
        l.allowed_routes
            .as_ref()
            .and_then(|ar| ar.namespaces.as_ref())
            .and_then(|ns| ns.selector.as_ref())
            .is_some()
    })
}

fn check_gateway_allowed_for_namespace<R: RouteInfo>(route: &mut R, check: &ParentCheck<'_>) -> bool {
    let kind = route.route_kind().as_str();
    if is_allowed(check.gateway, kind, check.route_namespace, check.namespace) {
        return true;
    }
    set_parent_condition(
        route,
        check.parent,
        new_condition(
            ROUTE_CONDITION_ACCEPTED,
            "False",
            ROUTE_REASON_NOT_ALLOWED_BY_LISTENERS,
            &format!("{kind} is not allowed to attach to this Gateway"),
        ),
    );
    false
}

fn check_gateway_route_kind_allowed<R: RouteInfo>(route: &mut R, check: &ParentCheck<'_>) -> bool {
    let kind = route.route_kind().as_str();
    if check
        .gateway
        .spec
        .listeners
        .iter()
        .any(|l| is_kind_allowed(l, kind))
    {
        return true;
    }
    set_parent_condition(
        route,
        check.parent,
        new_condition(
            ROUTE_CONDITION_ACCEPTED,
            "False",
            ROUTE_REASON_NOT_ALLOWED_BY_LISTENERS,
            &format!("No listener allows routes of kind {kind}"),
        ),
    );
    false
}

fn check_gateway_matching_ports<R: RouteInfo>(route: &mut R, check: &ParentCheck<'_>) -> bool {
    let Some(port) = check.parent.port else {
        return true;
    };
    if check.gateway.spec.listeners.iter().any(|l| l.port == port) {
        return true;
    }
    set_parent_condition(
        route,
        check.parent,
        new_condition(
            ROUTE_CONDITION_ACCEPTED,
            "False",
            ROUTE_REASON_NO_MATCHING_PARENT,
            &format!("No listener on the Gateway uses port {port}"),
        ),
    );
    false
}

fn check_gateway_matching_hostnames<R: RouteInfo>(route: &mut R, check: &ParentCheck<'_>) -> bool {
    let hostnames = route.hostnames();
    if hostnames.is_empty() {
        return true;
    }
    if !compute_hosts(check.gateway, &hostnames).is_empty() {
        return true;
    }
    set_parent_condition(
        route,
        check.parent,
        new_condition(
            ROUTE_CONDITION_ACCEPTED,
            "False",
            ROUTE_REASON_NO_MATCHING_LISTENER_HOSTNAME,
            "No listener hostname intersects the route hostnames",
        ),
    );
    false
}

fn check_gateway_matching_section<R: RouteInfo>(route: &mut R, check: &ParentCheck<'_>) -> bool {
    let Some(section) = check.parent.section_name.as_deref() else {
        return true;
    };
    if check.gateway.spec.listeners.iter().any(|l| l.name == section) {
        return true;
    }
    set_parent_condition(
        route,
        check.parent,
        new_condition(
            ROUTE_CONDITION_ACCEPTED,
            "False",
            ROUTE_REASON_NO_MATCHING_PARENT,
            &format!("No listener on the Gateway is named {section}"),
        ),
    );
    false
}

fn check_cross_namespace_backend_references<R: RouteInfo>(
    route: &mut R,
    route_namespace: &str,
    grants: &[ReferenceGrant],
) -> bool {
    let kind = route.route_kind().as_str();
    let mut continue_checks = true;
    for rule in route.rule_backend_refs() {
        for backend in rule {
            let ns = namespace_deref_or(backend.namespace.as_ref(), route_namespace);
            if ns != route_namespace
                && !is_backend_reference_allowed(route_namespace, &backend, kind, grants)
            {
                set_all_parents_condition(
                    route,
                    new_condition(
                        ROUTE_CONDITION_RESOLVED_REFS,
                        "False",
                        ROUTE_REASON_REF_NOT_PERMITTED,
                        "Cross namespace references are not allowed",
                    ),
                );
                continue_checks = false;
            }
        }
    }
    continue_checks
}

fn check_backend<R: RouteInfo>(route: &mut R) -> bool {
    let mut continue_checks = true;
    for rule in route.rule_backend_refs() {
        for backend in rule {
            if !backend.is_service() {
                set_all_parents_condition(
                    route,
                    new_condition(
                        ROUTE_CONDITION_RESOLVED_REFS,
                        "False",
                        ROUTE_REASON_INVALID_KIND,
                        &format!(
                            "Unsupported backend kind {}",
                            backend.kind.as_deref().unwrap_or_default()
                        ),
                    ),
                );
                continue_checks = false;
                continue;
            }
            if backend.port.is_none() {
                set_all_parents_condition(
                    route,
                    new_condition(
                        ROUTE_CONDITION_RESOLVED_REFS,
                        "False",
                        ROUTE_REASON_INVALID_KIND,
                        "Must have port for backend object reference",
                    ),
                );
                continue_checks = false;
            }
        }
    }
    continue_checks
}

async fn check_backend_is_existing_service<R: RouteInfo>(
    client: &Client,
    route: &mut R,
    route_namespace: &str,
) -> Result<()> {
    for rule in route.rule_backend_refs() {
        for backend in rule {
            if !backend.is_service() {
                continue;
            }
            let ns = namespace_deref_or(backend.namespace.as_ref(), route_namespace);
            let service_api: Api<Service> = Api::namespaced(client.clone(), &ns);
            match service_api.get_opt(&backend.name).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    set_all_parents_condition(
                        route,
                        new_condition(
                            ROUTE_CONDITION_RESOLVED_REFS,
                            "False",
                            ROUTE_REASON_BACKEND_NOT_FOUND,
                            &format!("Service {ns}/{} not found", backend.name),
                        ),
                    );
                }
                Err(error) => return Err(Error::KubeError(error)),
            }
        }
    }
    Ok(())
}

// Patches the status subresource of a route object if it changed.
pub async fn patch_route_status<R>(client: &Client, original_status: &Value, route: &R) -> Result<()>
where
    R: RouteInfo
        + Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let new_status = route.status_value();
    if statuses_equal(original_status, &new_status) {
        return Ok(());
    }
    let namespace = route.metadata().namespace()?;
    let name = route.metadata().name()?;
    let api: Api<R> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({
        "apiVersion": route.route_kind().api_version(),
        "kind": route.route_kind().as_str(),
        "status": new_status,
    });
    let params = kube::api::PatchParams::apply(FIELD_MANAGER).force();
    api.patch_status(name, &params, &kube::api::Patch::Apply(&patch))
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

// Computes the route objects affected by a backend Service event, scanning
// the route reflector store the way a field index would.
pub(crate) fn routes_for_backend_service<R>(
    store: &kube::runtime::reflector::Store<R>,
    service: &Service,
) -> Vec<kube::runtime::reflector::ObjectRef<R>>
where
    R: RouteInfo + Resource<DynamicType = ()> + Clone + 'static,
{
    let Some(service_namespace) = service.metadata.namespace.clone() else {
        return vec![];
    };
    let Some(service_name) = service.metadata.name.clone() else {
        return vec![];
    };
    store
        .state()
        .iter()
        .filter(|route| {
            let route_namespace = route.metadata().namespace.clone().unwrap_or_default();
            route.rule_backend_refs().iter().flatten().any(|backend| {
                backend.is_service()
                    && backend.name == service_name
                    && namespace_deref_or(backend.namespace.as_ref(), &route_namespace)
                        == service_namespace
            })
        })
        .filter_map(|route| route_object_ref(route.as_ref()))
        .collect()
}

// Computes the route objects parented to the given Gateway.
pub(crate) fn routes_for_gateway<R>(
    store: &kube::runtime::reflector::Store<R>,
    gateway: &Gateway,
) -> Vec<kube::runtime::reflector::ObjectRef<R>>
where
    R: RouteInfo + Resource<DynamicType = ()> + Clone + 'static,
{
    let Some(gateway_namespace) = gateway.metadata.namespace.clone() else {
        return vec![];
    };
    let Some(gateway_name) = gateway.metadata.name.clone() else {
        return vec![];
    };
    store
        .state()
        .iter()
        .filter(|route| {
            let route_namespace = route.metadata().namespace.clone().unwrap_or_default();
            route.parent_refs().iter().any(|parent| {
                parent.is_gateway()
                    && parent.name == gateway_name
                    && namespace_deref_or(parent.namespace.as_ref(), &route_namespace)
                        == gateway_namespace
            })
        })
        .filter_map(|route| route_object_ref(route.as_ref()))
        .collect()
}

// Every route in the store; used for ReferenceGrant events which may affect
// any cross-namespace reference.
pub(crate) fn all_routes<R>(
    store: &kube::runtime::reflector::Store<R>,
) -> Vec<kube::runtime::reflector::ObjectRef<R>>
where
    R: RouteInfo + Resource<DynamicType = ()> + Clone + 'static,
{
    store
        .state()
        .iter()
        .filter_map(|route| route_object_ref(route.as_ref()))
        .collect()
}

fn route_object_ref<R>(route: &R) -> Option<kube::runtime::reflector::ObjectRef<R>>
where
    R: RouteInfo + Resource<DynamicType = ()> + 'static,
{
    let name = route.metadata().name.as_deref()?;
    let namespace = route.metadata().namespace.as_deref()?;
    Some(kube::runtime::reflector::ObjectRef::new(name).within(namespace))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(type_: &str, status: &str, reason: &str, message: &str) -> metav1::Condition {
        new_condition(type_, status, reason, message)
    }

    #[test]
    fn merge_appends_new_condition_types() {
        let mut conditions = vec![];
        merge_condition(&mut conditions, cond("Accepted", "True", "Accepted", "ok"));
        merge_condition(&mut conditions, cond("ResolvedRefs", "True", "ResolvedRefs", "ok"));
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn merge_keeps_unchanged_condition() {
        let first = cond("Accepted", "True", "Accepted", "ok");
        let mut conditions = vec![first.clone()];
        // Same payload, newer timestamp: the original entry must survive.
        let mut update = cond("Accepted", "True", "Accepted", "ok");
        update.last_transition_time = metav1::Time(Utc::now() + chrono::Duration::seconds(60));
        merge_condition(&mut conditions, update);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first.last_transition_time);
    }

    #[test]
    fn merge_replaces_changed_condition() {
        let mut conditions = vec![cond("Accepted", "True", "Accepted", "ok")];
        merge_condition(&mut conditions, cond("Accepted", "False", "Invalid", "bad"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "False");
        assert_eq!(conditions[0].reason, "Invalid");
    }

    #[test]
    fn statuses_equal_ignores_last_transition_time() {
        let old = serde_json::json!({
            "conditions": [{"type": "Accepted", "status": "True", "lastTransitionTime": "2024-01-01T00:00:00Z"}],
        });
        let new = serde_json::json!({
            "conditions": [{"type": "Accepted", "status": "True", "lastTransitionTime": "2024-06-01T00:00:00Z"}],
        });
        assert!(statuses_equal(&old, &new));

        let changed = serde_json::json!({
            "conditions": [{"type": "Accepted", "status": "False", "lastTransitionTime": "2024-06-01T00:00:00Z"}],
        });
        assert!(!statuses_equal(&old, &changed));
    }
}
