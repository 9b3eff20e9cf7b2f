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

use chrono::Utc;
use gateway_api::apis::standard::constants::{GatewayConditionReason, GatewayConditionType};
use gateway_api::apis::standard::gatewayclasses::{GatewayClass, GatewayClassStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::api::{Api, Patch, PatchParams};
use serde_json::json;

use crate::consts::{
    FIELD_MANAGER, GATEWAY_CLASS_CONDITION_SUPPORTED_VERSION,
    GATEWAY_CLASS_REASON_SUPPORTED_VERSION, GATEWAY_CLASS_REASON_UNSUPPORTED_VERSION,
};
use crate::crds::GatewayApiInfo;
use crate::route_utils::set_condition;
use crate::{Error, Result};

pub fn is_accepted(gateway_class: &GatewayClass) -> bool {
    gateway_class
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions.iter().any(|condition| {
                condition.type_ == GatewayConditionType::Accepted.to_string()
                    && condition.status == "True"
            })
        })
}

// Marks the GatewayClass as accepted and records whether the installed
// Gateway API CRD bundle version is supported.
pub fn accept(gateway_class: &mut GatewayClass, info: &GatewayApiInfo) {
    let now = metav1::Time(Utc::now());
    let generation = gateway_class.metadata.generation;

    set_condition(
        gateway_class,
        metav1::Condition {
            type_: GatewayConditionType::Accepted.to_string(),
            status: String::from("True"),
            reason: GatewayConditionReason::Accepted.to_string(),
            observed_generation: generation,
            last_transition_time: now.clone(),
            message: String::from("Accepting responsibility for this GatewayClass"),
        },
    );

    let supported = bundle_version_supported(&info.bundle_version);
    set_condition(
        gateway_class,
        metav1::Condition {
            type_: GATEWAY_CLASS_CONDITION_SUPPORTED_VERSION.to_string(),
            status: String::from(if supported { "True" } else { "False" }),
            reason: String::from(if supported {
                GATEWAY_CLASS_REASON_SUPPORTED_VERSION
            } else {
                GATEWAY_CLASS_REASON_UNSUPPORTED_VERSION
            }),
            observed_generation: generation,
            last_transition_time: now,
            message: format!(
                "Gateway API CRD bundle version {} is {}",
                info.bundle_version,
                if supported { "supported" } else { "not supported" },
            ),
        },
    );
}

fn bundle_version_supported(bundle_version: &str) -> bool {
    bundle_version.starts_with("v1.")
}

// The feature set advertised on GatewayClass status. The Gateway API
// conformance spec requires ascending alphabetical order.
pub fn supported_features() -> Vec<&'static str> {
    let mut features = vec![
        "Gateway",
        "HTTPRoute",
        "HTTPRouteQueryParamMatching",
        "HTTPRouteMethodMatching",
        "HTTPRouteResponseHeaderModification",
        "HTTPRoutePortRedirect",
        "HTTPRouteSchemeRedirect",
        "HTTPRoutePathRedirect",
        "HTTPRouteBackendProtocolH2C",
        "HTTPRouteBackendProtocolWebSocket",
        "ReferenceGrant",
        "TLSRoute",
        "UDPRoute",
    ];
    features.sort_unstable();
    features
}

pub async fn patch_status(
    gatewayclass_api: &Api<GatewayClass>,
    name: &str,
    status: &GatewayClassStatus,
) -> Result<()> {
    let empty = vec![];
    let conditions = status.conditions.as_ref().unwrap_or(&empty);
    let features: Vec<_> = supported_features()
        .into_iter()
        .map(|name| json!({"name": name}))
        .collect();
    let patch = Patch::Apply(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "GatewayClass",
        "status": {
            "conditions": conditions,
            "supportedFeatures": features,
        }
    }));
    let params = PatchParams::apply(FIELD_MANAGER).force();
    gatewayclass_api
        .patch_status(name, &params, &patch)
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_features_are_sorted_ascending() {
        let features = supported_features();
        let mut sorted = features.clone();
        sorted.sort_unstable();
        assert_eq!(features, sorted);
        for pair in features.windows(2) {
            assert!(pair[0] < pair[1], "{} must sort before {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn accept_sets_both_conditions() {
        let mut gwc: GatewayClass = serde_json::from_value(json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "GatewayClass",
            "metadata": {"name": "caddy"},
            "spec": {"controllerName": "caddyserver.com/gateway-controller"},
        }))
        .expect("valid gateway class fixture");

        assert!(!is_accepted(&gwc));
        accept(
            &mut gwc,
            &GatewayApiInfo {
                bundle_version: "v1.2.1".to_string(),
                channel: "experimental".to_string(),
                kinds: vec![],
            },
        );
        assert!(is_accepted(&gwc));

        let conditions = gwc.status.as_ref().unwrap().conditions.as_ref().unwrap();
        let supported = conditions
            .iter()
            .find(|c| c.type_ == GATEWAY_CLASS_CONDITION_SUPPORTED_VERSION)
            .expect("SupportedVersion condition");
        assert_eq!(supported.status, "True");
    }

    #[test]
    fn unknown_bundle_version_is_unsupported() {
        let mut gwc: GatewayClass = serde_json::from_value(json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "GatewayClass",
            "metadata": {"name": "caddy"},
            "spec": {"controllerName": "caddyserver.com/gateway-controller"},
        }))
        .expect("valid gateway class fixture");

        accept(
            &mut gwc,
            &GatewayApiInfo {
                bundle_version: "v0.8.1".to_string(),
                ..Default::default()
            },
        );
        let conditions = gwc.status.as_ref().unwrap().conditions.as_ref().unwrap();
        let supported = conditions
            .iter()
            .find(|c| c.type_ == GATEWAY_CLASS_CONDITION_SUPPORTED_VERSION)
            .expect("SupportedVersion condition");
        assert_eq!(supported.status, "False");
        assert_eq!(supported.reason, GATEWAY_CLASS_REASON_UNSUPPORTED_VERSION);
    }
}
