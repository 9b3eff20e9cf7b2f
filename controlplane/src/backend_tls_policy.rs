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

//! BackendTLSPolicy (gateway.networking.k8s.io/v1alpha3).
//!
//! The gateway-api crate does not ship this type yet, so it is defined here
//! with the CustomResource derive.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// BackendTLSPolicy provides a way to configure how a Gateway connects to a
// backend via TLS.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha3",
    kind = "BackendTLSPolicy",
    plural = "backendtlspolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BackendTLSPolicySpec {
    // The targets of this policy; local object references to Services.
    pub target_refs: Vec<BackendTLSPolicyTargetRefs>,

    // How the Gateway validates the TLS certificate presented by the
    // backend.
    pub validation: BackendTLSPolicyValidation,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendTLSPolicyTargetRefs {
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl BackendTLSPolicyTargetRefs {
    // Whether this target reference points at a core Service resource.
    pub fn is_service(&self) -> bool {
        self.group.is_empty() && self.kind == "Service"
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendTLSPolicyValidation {
    // References to ConfigMaps or Secrets holding PEM CA certificates, keyed
    // under `ca.crt`. Resolved in the Gateway's namespace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ca_certificate_refs: Vec<BackendTLSPolicyValidationCaCertificateRefs>,

    // A pre-defined certificate set, e.g. `System`, used when no explicit CA
    // references are given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub well_known_ca_certificates: Option<String>,

    // The server name the backend certificate must be valid for.
    pub hostname: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendTLSPolicyValidationCaCertificateRefs {
    pub group: String,
    pub kind: String,
    pub name: String,
}

impl BackendTLSPolicyValidationCaCertificateRefs {
    pub fn is_config_map(&self) -> bool {
        self.group.is_empty() && self.kind == "ConfigMap"
    }

    pub fn is_secret(&self) -> bool {
        self.group.is_empty() && self.kind == "Secret"
    }
}
