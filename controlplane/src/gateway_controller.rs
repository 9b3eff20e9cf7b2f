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

//! The Gateway reconciler: snapshots the cluster, filters attached routes,
//! compiles the Caddy configuration, programs every data-plane replica, and
//! reflects the outcome in status.

use futures::StreamExt;
use std::collections::BTreeMap;
use std::{sync::Arc, time::Duration};

use gateway_api::apis::experimental::tcproutes::TCPRoute;
use gateway_api::apis::experimental::tlsroutes::TLSRoute;
use gateway_api::apis::experimental::udproutes::UDPRoute;
use gateway_api::apis::standard::constants::{GatewayConditionReason, GatewayConditionType};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use gateway_api::apis::standard::gateways::{Gateway, GatewayListenersAllowedRoutesNamespacesFrom};
use gateway_api::apis::experimental::grpcroutes::GRPCRoute;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Namespace, Secret, Service};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{
    api::{Api, ListParams},
    runtime::{controller::Action, watcher::Config, Controller},
    Resource, ResourceExt,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend_tls_policy::BackendTLSPolicy;
use crate::caddy::{self, is_secret_ref};
use crate::consts::OWNING_GATEWAY_LABEL;
use crate::dataplane;
use crate::gateway_utils::{
    filter_attached, matches_controller_name, namespace_deref_or, patch_status,
    set_gateway_condition, set_gateway_status_addresses,
};
use crate::gatewayclass_utils::is_accepted;
use crate::route_utils::statuses_equal;
use crate::routes::RouteInfo;
use crate::{spawn_reflector, Context, Error, NamespaceName, NamespacedName, Result};

pub async fn reconcile(gateway: Arc<Gateway>, ctx: Arc<Context>) -> Result<Action> {
    let client = ctx.client.clone();
    let key = gateway.metadata.namespaced_name()?;

    // Ignore the gateway if it is being deleted.
    if gateway.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let gateway_api: Api<Gateway> = Api::namespaced(client.clone(), &key.namespace);
    let mut gw = (*gateway).clone();
    let original_status = serde_json::to_value(&gateway.status)?;

    // Get the GatewayClass referenced by the Gateway.
    let class_api = Api::<GatewayClass>::all(client.clone());
    let class = match class_api
        .get_opt(&gw.spec.gateway_class_name)
        .await
        .map_err(Error::KubeError)?
    {
        Some(class) => class,
        None => {
            set_gateway_condition(
                &mut gw,
                GatewayConditionType::Accepted,
                "False",
                GatewayConditionReason::Invalid,
                "GatewayClass does not exist",
            );
            patch_if_changed(&gateway_api, &key, &original_status, &gw).await?;
            return Err(Error::InvalidConfigError(format!(
                "gatewayclass {} does not exist",
                gw.spec.gateway_class_name,
            )));
        }
    };
    // ref; https://gateway-api.sigs.k8s.io/api-types/gatewayclass/#gatewayclass-controller-selection
    if !matches_controller_name(&class.spec.controller_name) {
        debug!(gateway = %key, "ignoring Gateway as it requests another controller");
        return Ok(Action::await_change());
    }
    if !is_accepted(&class) {
        debug!(gateway = %key, class = %class.name_any(), "GatewayClass is not accepted yet");
        return Ok(Action::await_change());
    }
    info!(gateway = %key, "reconciling");

    // Snapshot the cluster objects synthesis depends on. Reconciles of the
    // same key are serialized, so the snapshot is consistent for this run.
    let http_routes = Api::<HTTPRoute>::all(client.clone())
        .list(&ListParams::default())
        .await
        .map_err(Error::KubeError)?
        .items;
    let grpc_routes = if ctx.api_info.has_kind("GRPCRoute") {
        Api::<GRPCRoute>::all(client.clone())
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?
            .items
    } else {
        vec![]
    };
    let tcp_routes = if ctx.api_info.has_kind("TCPRoute") {
        Api::<TCPRoute>::all(client.clone())
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?
            .items
    } else {
        vec![]
    };
    let tls_routes = if ctx.api_info.has_kind("TLSRoute") {
        Api::<TLSRoute>::all(client.clone())
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?
            .items
    } else {
        vec![]
    };
    let udp_routes = if ctx.api_info.has_kind("UDPRoute") {
        Api::<UDPRoute>::all(client.clone())
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?
            .items
    } else {
        vec![]
    };
    let grants = Api::<ReferenceGrant>::all(client.clone())
        .list(&ListParams::default())
        .await
        .map_err(Error::KubeError)?
        .items;
    let backend_tls_policies = if ctx.api_info.has_kind("BackendTLSPolicy") {
        Api::<BackendTLSPolicy>::all(client.clone())
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?
            .items
    } else {
        vec![]
    };
    let services = Api::<Service>::all(client.clone())
        .list(&ListParams::default())
        .await
        .map_err(Error::KubeError)?
        .items;
    let namespaces: BTreeMap<String, Namespace> = Api::<Namespace>::all(client.clone())
        .list(&ListParams::default())
        .await
        .map_err(Error::KubeError)?
        .items
        .into_iter()
        .filter_map(|ns| ns.metadata.name.clone().map(|name| (name, ns)))
        .collect();

    // Only attached routes participate in synthesis. SNI-routed kinds also
    // need a non-empty hostname intersection.
    let http_routes = filter_attached(&gw, &http_routes, &namespaces, false);
    let grpc_routes = filter_attached(&gw, &grpc_routes, &namespaces, true);
    let tcp_routes = filter_attached(&gw, &tcp_routes, &namespaces, false);
    let tls_routes = filter_attached(&gw, &tls_routes, &namespaces, true);
    let udp_routes = filter_attached(&gw, &udp_routes, &namespaces, false);

    set_gateway_condition(
        &mut gw,
        GatewayConditionType::Accepted,
        "True",
        GatewayConditionReason::Accepted,
        "Gateway scheduled",
    );

    // TLS material is fetched here, the reconcile's suspension point, so
    // synthesis itself stays a pure function of the snapshot.
    let mut secrets = fetch_listener_secrets(&client, &gw).await?;
    let (config_maps, ca_secrets) = fetch_ca_sources(&client, &gw, &backend_tls_policies).await?;
    secrets.extend(ca_secrets);

    let input = caddy::Input {
        gateway: gateway.as_ref(),
        http_routes: http_routes.as_slice(),
        grpc_routes: grpc_routes.as_slice(),
        tcp_routes: tcp_routes.as_slice(),
        tls_routes: tls_routes.as_slice(),
        udp_routes: udp_routes.as_slice(),
        grants: grants.as_slice(),
        backend_tls_policies: backend_tls_policies.as_slice(),
        services: services.as_slice(),
        secrets: secrets.as_slice(),
        config_maps: config_maps.as_slice(),
    };
    let config = input.config()?;

    // Program every replica; per-replica failures were already logged and
    // the next reconcile retries them.
    match dataplane::program(&client, &ctx.dataplane, &gateway, &config).await {
        Ok(outcomes) => {
            let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
            debug!(
                gateway = %key,
                replicas = outcomes.len(),
                failed,
                "programmed data-plane replicas",
            );
        }
        Err(error @ Error::NoResourcesError(_)) => {
            set_gateway_condition(
                &mut gw,
                GatewayConditionType::Programmed,
                "False",
                GatewayConditionReason::NoResources,
                "No data-plane endpoints are available",
            );
            patch_if_changed(&gateway_api, &key, &original_status, &gw).await?;
            return Err(error);
        }
        Err(error) => {
            patch_if_changed(&gateway_api, &key, &original_status, &gw).await?;
            return Err(error);
        }
    }

    // Reflect the data-plane Service's addresses.
    let labeled_services = Api::<Service>::all(client.clone())
        .list(&ListParams::default().labels(&format!("{OWNING_GATEWAY_LABEL}={}", key.name)))
        .await
        .map_err(Error::KubeError)?;
    match labeled_services.items.first() {
        None => {
            set_gateway_condition(
                &mut gw,
                GatewayConditionType::Programmed,
                "False",
                GatewayConditionReason::NoResources,
                "No Service found for this Gateway",
            );
            patch_if_changed(&gateway_api, &key, &original_status, &gw).await?;
            return Err(Error::InvalidConfigError(format!(
                "no service found for gateway {key}",
            )));
        }
        Some(service) if !has_load_balancer_ingress(service) => {
            set_gateway_condition(
                &mut gw,
                GatewayConditionType::Programmed,
                "False",
                GatewayConditionReason::AddressNotAssigned,
                "Address is not ready",
            );
            patch_if_changed(&gateway_api, &key, &original_status, &gw).await?;
            return Err(Error::InvalidConfigError(format!(
                "load balancer status is not ready for gateway {key}",
            )));
        }
        Some(service) => {
            set_gateway_status_addresses(&mut gw, service);
        }
    }

    set_gateway_condition(
        &mut gw,
        GatewayConditionType::Programmed,
        "True",
        GatewayConditionReason::Programmed,
        "Gateway has been programmed",
    );
    patch_if_changed(&gateway_api, &key, &original_status, &gw).await?;

    info!(gateway = %key, "successfully reconciled Gateway");
    // Requeue so route-status convergence is eventually picked up even
    // without further events.
    Ok(Action::requeue(Duration::from_secs(60)))
}

pub async fn controller(ctx: Context) -> Result<()> {
    let client = ctx.client.clone();
    let gateway_api = Api::<Gateway>::all(client.clone());
    gateway_api
        .list(&ListParams::default().limit(1))
        .await
        .map_err(Error::CRDNotFoundError)?;

    // The gateway store backs the mappers for objects that carry no direct
    // back-reference to a Gateway (Secrets, Namespaces, ReferenceGrants).
    let store = spawn_reflector::<Gateway>(client.clone());
    let class_store = store.clone();
    let secret_store = store.clone();
    let namespace_store = store.clone();
    let grant_store = store.clone();
    let policy_store = store;

    let labeled = Config::default().labels(OWNING_GATEWAY_LABEL).any_semantic();
    let mut controller = Controller::new(gateway_api, Config::default().any_semantic())
        .watches(
            Api::<GatewayClass>::all(client.clone()),
            Config::default().any_semantic(),
            move |class| gateways_for_class(&class_store, &class),
        )
        .watches(
            Api::<HTTPRoute>::all(client.clone()),
            Config::default().any_semantic(),
            gateways_for_route_parents::<HTTPRoute>,
        )
        .watches(
            Api::<ReferenceGrant>::all(client.clone()),
            Config::default().any_semantic(),
            move |_| all_gateways(&grant_store),
        )
        .watches(
            Api::<Secret>::all(client.clone()),
            Config::default().any_semantic(),
            move |secret| gateways_for_secret(&secret_store, &secret),
        )
        .watches(
            Api::<Namespace>::all(client.clone()),
            Config::default().any_semantic(),
            move |namespace| gateways_for_namespace(&namespace_store, &namespace),
        )
        .watches(
            Api::<Service>::all(client.clone()),
            labeled.clone(),
            owning_gateway_ref,
        )
        .watches(
            Api::<Endpoints>::all(client.clone()),
            labeled,
            owning_gateway_ref,
        );

    if ctx.api_info.has_kind("GRPCRoute") {
        controller = controller.watches(
            Api::<GRPCRoute>::all(client.clone()),
            Config::default().any_semantic(),
            gateways_for_route_parents::<GRPCRoute>,
        );
    }
    if ctx.api_info.has_kind("TCPRoute") {
        controller = controller.watches(
            Api::<TCPRoute>::all(client.clone()),
            Config::default().any_semantic(),
            gateways_for_route_parents::<TCPRoute>,
        );
    }
    if ctx.api_info.has_kind("TLSRoute") {
        controller = controller.watches(
            Api::<TLSRoute>::all(client.clone()),
            Config::default().any_semantic(),
            gateways_for_route_parents::<TLSRoute>,
        );
    }
    if ctx.api_info.has_kind("UDPRoute") {
        controller = controller.watches(
            Api::<UDPRoute>::all(client.clone()),
            Config::default().any_semantic(),
            gateways_for_route_parents::<UDPRoute>,
        );
    }
    if ctx.api_info.has_kind("BackendTLSPolicy") {
        controller = controller.watches(
            Api::<BackendTLSPolicy>::all(client.clone()),
            Config::default().any_semantic(),
            move |_| all_gateways(&policy_store),
        );
    }

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(ctx))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

fn error_policy(_: Arc<Gateway>, error: &Error, _: Arc<Context>) -> Action {
    warn!("reconcile failed: {error:?}");
    Action::requeue(Duration::from_secs(5))
}

async fn patch_if_changed(
    gateway_api: &Api<Gateway>,
    key: &NamespacedName,
    original_status: &Value,
    gateway: &Gateway,
) -> Result<()> {
    let new_status = serde_json::to_value(&gateway.status)?;
    if statuses_equal(original_status, &new_status) {
        return Ok(());
    }
    patch_status(
        gateway_api,
        &key.name,
        gateway.status.as_ref().unwrap_or(&Default::default()),
    )
    .await
}

fn has_load_balancer_ingress(service: &Service) -> bool {
    service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .is_some_and(|ingress| !ingress.is_empty())
}

// Fetches the Secrets referenced by the Gateway's TLS listeners. A read
// failure (including a missing Secret) fails the reconcile; serving with a
// partial certificate set is worse than retrying.
async fn fetch_listener_secrets(client: &kube::Client, gateway: &Gateway) -> Result<Vec<Secret>> {
    let gateway_namespace = gateway.metadata.namespace.as_deref().unwrap_or_default();
    let mut secrets = Vec::new();
    for listener in &gateway.spec.listeners {
        let Some(tls) = &listener.tls else {
            continue;
        };
        for cert_ref in tls.certificate_refs.iter().flatten() {
            if !is_secret_ref(cert_ref) {
                continue;
            }
            let namespace = namespace_deref_or(cert_ref.namespace.as_ref(), gateway_namespace);
            let secret_api: Api<Secret> = Api::namespaced(client.clone(), &namespace);
            let secret = secret_api
                .get(&cert_ref.name)
                .await
                .map_err(Error::KubeError)?;
            secrets.push(secret);
        }
    }
    Ok(secrets)
}

// Fetches the ConfigMaps and Secrets BackendTLSPolicies use as CA sources.
// These are local references resolved in the Gateway's namespace; missing
// sources are skipped with a log and the policy simply contributes no CA
// certificates.
async fn fetch_ca_sources(
    client: &kube::Client,
    gateway: &Gateway,
    policies: &[BackendTLSPolicy],
) -> Result<(Vec<ConfigMap>, Vec<Secret>)> {
    let gateway_namespace = gateway.metadata.namespace.as_deref().unwrap_or_default();
    let mut config_maps = Vec::new();
    let mut secrets = Vec::new();
    for policy in policies {
        for ca_ref in &policy.spec.validation.ca_certificate_refs {
            if ca_ref.is_config_map() {
                let api: Api<ConfigMap> = Api::namespaced(client.clone(), gateway_namespace);
                match api.get_opt(&ca_ref.name).await.map_err(Error::KubeError)? {
                    Some(config_map) => config_maps.push(config_map),
                    None => warn!(
                        name = %ca_ref.name,
                        namespace = gateway_namespace,
                        "ConfigMap referenced by BackendTLSPolicy not found",
                    ),
                }
            } else if ca_ref.is_secret() {
                let api: Api<Secret> = Api::namespaced(client.clone(), gateway_namespace);
                match api.get_opt(&ca_ref.name).await.map_err(Error::KubeError)? {
                    Some(secret) => secrets.push(secret),
                    None => warn!(
                        name = %ca_ref.name,
                        namespace = gateway_namespace,
                        "Secret referenced by BackendTLSPolicy not found",
                    ),
                }
            }
        }
    }
    Ok((config_maps, secrets))
}

// Maps a Service or Endpoints event to its owning Gateway via the
// owning-gateway label.
fn owning_gateway_ref<K>(object: K) -> Vec<ObjectRef<Gateway>>
where
    K: Resource<DynamicType = ()>,
{
    let Some(name) = object.labels().get(OWNING_GATEWAY_LABEL) else {
        return vec![];
    };
    let Some(namespace) = object.meta().namespace.as_deref() else {
        return vec![];
    };
    vec![ObjectRef::new(name).within(namespace)]
}

// Maps a route event to its parent Gateways through parentRefs.
fn gateways_for_route_parents<R>(route: R) -> Vec<ObjectRef<Gateway>>
where
    R: RouteInfo,
{
    let route_namespace = route.metadata().namespace.clone().unwrap_or_default();
    route
        .parent_refs()
        .iter()
        .filter(|parent| parent.is_gateway())
        .map(|parent| {
            let namespace = namespace_deref_or(parent.namespace.as_ref(), &route_namespace);
            ObjectRef::new(&parent.name).within(&namespace)
        })
        .collect()
}

fn gateways_for_class(store: &Store<Gateway>, class: &GatewayClass) -> Vec<ObjectRef<Gateway>> {
    let Some(class_name) = class.metadata.name.as_deref() else {
        return vec![];
    };
    store
        .state()
        .iter()
        .filter(|gw| gw.spec.gateway_class_name == class_name)
        .filter_map(|gw| gateway_object_ref(gw))
        .collect()
}

fn gateways_for_secret(store: &Store<Gateway>, secret: &Secret) -> Vec<ObjectRef<Gateway>> {
    let Some(secret_namespace) = secret.metadata.namespace.as_deref() else {
        return vec![];
    };
    let Some(secret_name) = secret.metadata.name.as_deref() else {
        return vec![];
    };
    store
        .state()
        .iter()
        .filter(|gw| {
            let gateway_namespace = gw.metadata.namespace.clone().unwrap_or_default();
            gw.spec.listeners.iter().any(|listener| {
                listener
                    .tls
                    .as_ref()
                    .and_then(|tls| tls.certificate_refs.as_ref())
                    .is_some_and(|refs| {
                        refs.iter().any(|cert_ref| {
                            is_secret_ref(cert_ref)
                                && cert_ref.name == secret_name
                                && namespace_deref_or(cert_ref.namespace.as_ref(), &gateway_namespace)
                                    == secret_namespace
                        })
                    })
            })
        })
        .filter_map(|gw| gateway_object_ref(gw))
        .collect()
}

fn gateways_for_namespace(store: &Store<Gateway>, namespace: &Namespace) -> Vec<ObjectRef<Gateway>> {
    let Some(namespace_name) = namespace.metadata.name.as_deref() else {
        return vec![];
    };
    let labels = namespace.metadata.labels.clone().unwrap_or_default();
    store
        .state()
        .iter()
        .filter(|gw| {
            let gateway_namespace = gw.metadata.namespace.clone().unwrap_or_default();
            gw.spec.listeners.iter().any(|listener| {
                let Some(namespaces) = listener
                    .allowed_routes
                    .as_ref()
                    .and_then(|ar| ar.namespaces.as_ref())
                else {
                    return false;
                };
                match namespaces.from {
                    Some(GatewayListenersAllowedRoutesNamespacesFrom::All) => true,
                    Some(GatewayListenersAllowedRoutesNamespacesFrom::Same) | None => {
                        namespace_name == gateway_namespace
                    }
                    Some(GatewayListenersAllowedRoutesNamespacesFrom::Selector) => namespaces
                        .selector
                        .as_ref()
                        .is_some_and(|selector| {
                            selector
                                .match_labels
                                .as_ref()
                                .is_some_and(|match_labels| {
                                    match_labels
                                        .iter()
                                        .all(|(k, v)| labels.get(k) == Some(v))
                                })
                        }),
                }
            })
        })
        .filter_map(|gw| gateway_object_ref(gw))
        .collect()
}

fn all_gateways(store: &Store<Gateway>) -> Vec<ObjectRef<Gateway>> {
    store
        .state()
        .iter()
        .filter_map(|gw| gateway_object_ref(gw))
        .collect()
}

fn gateway_object_ref(gateway: &Gateway) -> Option<ObjectRef<Gateway>> {
    let name = gateway.metadata.name.as_deref()?;
    let namespace = gateway.metadata.namespace.as_deref()?;
    Some(ObjectRef::new(name).within(namespace))
}
