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

//! Startup preflight over the installed Gateway API CRDs.

use std::collections::BTreeMap;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::{error, info};

use crate::consts::{BUNDLE_VERSION_ANNOTATION, CHANNEL_ANNOTATION, GATEWAY_GROUP, GATEWAY_X_GROUP};
use crate::{Error, Result};

// CRDs this controller cannot run without.
pub const REQUIRED_KINDS: [&str; 4] = ["GatewayClass", "Gateway", "HTTPRoute", "ReferenceGrant"];

// CRDs whose reconcilers are gated on their presence.
pub const OPTIONAL_KINDS: [&str; 5] = [
    "BackendTLSPolicy",
    "GRPCRoute",
    "TCPRoute",
    "TLSRoute",
    "UDPRoute",
];

// What the preflight learned about the installed Gateway API bundle.
#[derive(Debug, Clone, Default)]
pub struct GatewayApiInfo {
    pub bundle_version: String,
    pub channel: String,
    // Kinds present in the Gateway API groups.
    pub kinds: Vec<String>,
}

impl GatewayApiInfo {
    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.iter().any(|k| k == kind)
    }
}

// Lists the installed CustomResourceDefinitions, verifies the required
// Gateway API CRDs are present, and collapses the observed bundle version
// and channel annotations. Missing optional CRDs are logged; missing
// required CRDs fail startup.
pub async fn check_crds(client: &Client) -> Result<GatewayApiInfo> {
    let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crds = crd_api
        .list(&ListParams::default())
        .await
        .map_err(Error::CRDNotFoundError)?;

    let filtered: Vec<&CustomResourceDefinition> = crds
        .items
        .iter()
        .filter(|crd| {
            crd.spec.group == GATEWAY_GROUP || crd.spec.group == GATEWAY_X_GROUP
        })
        .collect();

    let mut versions: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut channels: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut kinds = Vec::new();
    for crd in &filtered {
        let kind = crd.spec.names.kind.clone();
        let annotations = crd.metadata.annotations.clone().unwrap_or_default();
        let version = annotations
            .get(BUNDLE_VERSION_ANNOTATION)
            .cloned()
            .unwrap_or_default();
        let channel = annotations
            .get(CHANNEL_ANNOTATION)
            .cloned()
            .unwrap_or_default();
        info!(
            group = %crd.spec.group,
            kind = %kind,
            bundle_version = %version,
            channel = %channel,
            "found CustomResourceDefinition",
        );
        versions.entry(version).or_default().push(kind.clone());
        channels.entry(channel).or_default().push(kind.clone());
        kinds.push(kind);
    }

    let info = collapse(versions, channels, kinds);

    let missing: Vec<String> = REQUIRED_KINDS
        .iter()
        .filter(|kind| !info.has_kind(kind))
        .map(|kind| kind.to_string())
        .collect();
    for kind in &missing {
        error!(kind = %kind, "required Gateway API CRD is missing");
    }
    for kind in OPTIONAL_KINDS {
        if !info.has_kind(kind) {
            info!(kind, "optional Gateway API CRD is missing; its reconciler stays disabled");
        }
    }
    if !missing.is_empty() {
        return Err(Error::MissingCrdsError(missing));
    }

    info!(
        bundle_version = %info.bundle_version,
        channel = %info.channel,
        "found Gateway API CRDs",
    );
    Ok(info)
}

// Collapses the observed bundle versions and channels to a single pair. The
// Gateway API prohibits mixing bundles; if several are observed anyway, log
// an error and pick one.
fn collapse(
    versions: BTreeMap<String, Vec<String>>,
    channels: BTreeMap<String, Vec<String>>,
    kinds: Vec<String>,
) -> GatewayApiInfo {
    if versions.len() > 1 {
        error!(
            versions = ?versions.keys().collect::<Vec<_>>(),
            "multiple Gateway API bundle versions are installed; re-install the Gateway API CRDs",
        );
    }
    if channels.len() > 1 {
        error!(
            channels = ?channels.keys().collect::<Vec<_>>(),
            "multiple Gateway API channels are installed; re-install the Gateway API CRDs",
        );
    }
    GatewayApiInfo {
        bundle_version: versions.keys().next_back().cloned().unwrap_or_default(),
        channel: channels.keys().next_back().cloned().unwrap_or_default(),
        kinds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_picks_single_version_and_channel() {
        let mut versions = BTreeMap::new();
        versions.insert("v1.2.1".to_string(), vec!["Gateway".to_string()]);
        let mut channels = BTreeMap::new();
        channels.insert("experimental".to_string(), vec!["Gateway".to_string()]);

        let info = collapse(versions, channels, vec!["Gateway".to_string()]);
        assert_eq!(info.bundle_version, "v1.2.1");
        assert_eq!(info.channel, "experimental");
        assert!(info.has_kind("Gateway"));
        assert!(!info.has_kind("TCPRoute"));
    }

    #[test]
    fn collapse_with_conflicting_versions_still_picks_one() {
        let mut versions = BTreeMap::new();
        versions.insert("v1.1.0".to_string(), vec!["Gateway".to_string()]);
        versions.insert("v1.2.1".to_string(), vec!["HTTPRoute".to_string()]);

        let info = collapse(versions, BTreeMap::new(), vec![]);
        assert!(!info.bundle_version.is_empty());
    }

    #[test]
    fn missing_required_crds_error_lists_them() {
        let err = Error::MissingCrdsError(vec!["Gateway".to_string(), "HTTPRoute".to_string()]);
        assert_eq!(err.to_string(), "missing required crds: Gateway, HTTPRoute");
    }
}
