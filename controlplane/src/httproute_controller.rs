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

use futures::StreamExt;
use std::{sync::Arc, time::Duration};

use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use gateway_api::apis::standard::referencegrants::ReferenceGrant;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, ListParams},
    runtime::{controller::Action, watcher::Config, Controller},
};
use tracing::{debug, warn};

use crate::route_utils::{
    all_routes, patch_route_status, routes_for_backend_service, routes_for_gateway, validate_route,
};
use crate::routes::RouteInfo;
use crate::{spawn_reflector, Context, Error, NamespaceName, Result};

pub async fn reconcile(route: Arc<HTTPRoute>, ctx: Arc<Context>) -> Result<Action> {
    let client = ctx.client.clone();
    let key = route.metadata.namespaced_name()?;

    if route.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let mut updated = (*route).clone();
    let original_status = updated.status_value();

    let grants = Api::<ReferenceGrant>::all(client.clone())
        .list(&ListParams::default())
        .await
        .map_err(Error::KubeError)?;

    validate_route(&client, &mut updated, &grants.items).await?;
    patch_route_status(&client, &original_status, &updated).await?;

    debug!(route = %key, "reconciled HTTPRoute");
    Ok(Action::await_change())
}

pub async fn controller(ctx: Context) -> Result<()> {
    let route_api = Api::<HTTPRoute>::all(ctx.client.clone());
    route_api
        .list(&ListParams::default().limit(1))
        .await
        .map_err(Error::CRDNotFoundError)?;

    // Backend-Service and parent-Gateway events fan out through the route
    // store, standing in for server-side field indexes.
    let store = spawn_reflector::<HTTPRoute>(ctx.client.clone());
    let service_store = store.clone();
    let gateway_store = store.clone();
    let grant_store = store;

    Controller::new(route_api, Config::default().any_semantic())
        .watches(
            Api::<Service>::all(ctx.client.clone()),
            Config::default().any_semantic(),
            move |service| routes_for_backend_service(&service_store, &service),
        )
        .watches(
            Api::<Gateway>::all(ctx.client.clone()),
            Config::default().any_semantic(),
            move |gateway| routes_for_gateway(&gateway_store, &gateway),
        )
        .watches(
            Api::<ReferenceGrant>::all(ctx.client.clone()),
            Config::default().any_semantic(),
            move |_| all_routes(&grant_store),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(ctx))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

fn error_policy(_: Arc<HTTPRoute>, error: &Error, _: Arc<Context>) -> Action {
    warn!("reconcile failed: {error:?}");
    Action::requeue(Duration::from_secs(5))
}
