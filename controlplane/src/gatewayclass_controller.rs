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

use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use kube::{
    api::{Api, ListParams},
    runtime::{controller::Action, watcher::Config, Controller},
};
use tracing::{info, warn};

use crate::gateway_utils::matches_controller_name;
use crate::gatewayclass_utils::{accept, patch_status};
use crate::route_utils::statuses_equal;
use crate::{Context, Error, Result};

pub async fn reconcile(gateway_class: Arc<GatewayClass>, ctx: Arc<Context>) -> Result<Action> {
    let name = gateway_class
        .metadata
        .name
        .clone()
        .ok_or(Error::MissingResourceName)?;

    if gateway_class.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    if !matches_controller_name(&gateway_class.spec.controller_name) {
        // Skip reconciling because we don't manage this resource; requeue in
        // case its controllerName is later changed to ours.
        return Ok(Action::requeue(Duration::from_secs(3600 / 2)));
    }

    let mut gwc = (*gateway_class).clone();
    accept(&mut gwc, &ctx.api_info);

    let old_status = serde_json::to_value(&gateway_class.status)?;
    let new_status = serde_json::to_value(&gwc.status)?;
    if !statuses_equal(&old_status, &new_status) {
        info!(name = %name, "marking gateway class as accepted");
        let gatewayclass_api = Api::<GatewayClass>::all(ctx.client.clone());
        patch_status(&gatewayclass_api, &name, &gwc.status.unwrap_or_default()).await?;
    }

    Ok(Action::await_change())
}

pub async fn controller(ctx: Context) -> Result<()> {
    let gwc_api = Api::<GatewayClass>::all(ctx.client.clone());
    gwc_api
        .list(&ListParams::default().limit(1))
        .await
        .map_err(Error::CRDNotFoundError)?;

    Controller::new(gwc_api, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(ctx))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

fn error_policy(_: Arc<GatewayClass>, error: &Error, _: Arc<Context>) -> Action {
    warn!("reconcile failed: {error:?}");
    Action::requeue(Duration::from_secs(5))
}
