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

//! A common view over the Gateway API route kinds.
//!
//! The generated Gateway API types give every route kind its own parent-ref,
//! backend-ref, and status structs even though they are structurally
//! identical. `RouteInfo` projects them onto shared view types so attachment,
//! validation, and synthesis can treat routes uniformly.

use gateway_api::apis::experimental::tcproutes::{TCPRoute, TCPRouteStatus, TCPRouteStatusParents, TCPRouteStatusParentsParentRef};
use gateway_api::apis::experimental::tlsroutes::{TLSRoute, TLSRouteStatus, TLSRouteStatusParents, TLSRouteStatusParentsParentRef};
use gateway_api::apis::experimental::udproutes::{UDPRoute, UDPRouteStatus, UDPRouteStatusParents, UDPRouteStatusParentsParentRef};
use gateway_api::apis::experimental::grpcroutes::{GRPCRoute, GRPCRouteStatus, GRPCRouteStatusParents, GRPCRouteStatusParentsParentRef};
use gateway_api::apis::standard::httproutes::{HTTPRoute, HTTPRouteStatus, HTTPRouteStatusParents, HTTPRouteStatusParentsParentRef};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, ObjectMeta};

use crate::consts::{GATEWAY_CLASS_CONTROLLER_NAME, GATEWAY_GROUP};
use crate::route_utils::merge_condition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Http,
    Grpc,
    Tcp,
    Tls,
    Udp,
}

impl RouteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteKind::Http => "HTTPRoute",
            RouteKind::Grpc => "GRPCRoute",
            RouteKind::Tcp => "TCPRoute",
            RouteKind::Tls => "TLSRoute",
            RouteKind::Udp => "UDPRoute",
        }
    }

    // The apiVersion used when patching status for this kind.
    pub fn api_version(self) -> &'static str {
        match self {
            RouteKind::Http | RouteKind::Grpc => "gateway.networking.k8s.io/v1",
            RouteKind::Tcp | RouteKind::Tls | RouteKind::Udp => {
                "gateway.networking.k8s.io/v1alpha2"
            }
        }
    }
}

impl std::fmt::Display for RouteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ParentRef mirrors the per-kind `parentRefs` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentRef {
    pub group: Option<String>,
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: String,
    pub section_name: Option<String>,
    pub port: Option<i32>,
}

impl ParentRef {
    // Whether this reference points at a Gateway resource.
    pub fn is_gateway(&self) -> bool {
        self.group.as_deref().is_none_or(|g| g == GATEWAY_GROUP)
            && self.kind.as_deref().is_none_or(|k| k == "Gateway")
    }
}

// BackendRef mirrors the per-kind `backendRefs` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendRef {
    pub group: Option<String>,
    pub kind: Option<String>,
    pub name: String,
    pub namespace: Option<String>,
    pub port: Option<i32>,
    pub weight: Option<i32>,
}

impl BackendRef {
    // Whether this reference points at a core Service resource.
    pub fn is_service(&self) -> bool {
        self.group.as_deref().is_none_or(|g| g.is_empty())
            && self.kind.as_deref().is_none_or(|k| k == "Service")
    }
}

// ParentStatus mirrors the per-kind recorded `status.parents` entries.
#[derive(Debug, Clone, Default)]
pub struct ParentStatus {
    pub parent_ref: ParentRef,
    pub controller_name: String,
    pub conditions: Vec<Condition>,
}

pub trait RouteInfo {
    fn route_kind(&self) -> RouteKind;
    fn metadata(&self) -> &ObjectMeta;
    fn hostnames(&self) -> Vec<String>;
    fn parent_refs(&self) -> Vec<ParentRef>;
    // Backend references grouped per rule, in rule order.
    fn rule_backend_refs(&self) -> Vec<Vec<BackendRef>>;
    fn parent_statuses(&self) -> Vec<ParentStatus>;
    // Merges the condition into the status block for the given parent,
    // appending a new parent entry under our controller name if absent.
    fn merge_parent_condition(&mut self, parent_ref: &ParentRef, condition: Condition);
    // The current status serialized for patching and change detection.
    fn status_value(&self) -> serde_json::Value;
}

macro_rules! opt_vec {
    ($v:expr) => {
        $v.clone().unwrap_or_default()
    };
}

impl RouteInfo for HTTPRoute {
    fn route_kind(&self) -> RouteKind {
        RouteKind::Http
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn hostnames(&self) -> Vec<String> {
        opt_vec!(self.spec.hostnames)
    }

    fn parent_refs(&self) -> Vec<ParentRef> {
        self.spec
            .parent_refs
            .iter()
            .flatten()
            .map(|r| ParentRef {
                group: r.group.clone(),
                kind: r.kind.clone(),
                namespace: r.namespace.clone(),
                name: r.name.clone(),
                section_name: r.section_name.clone(),
                port: r.port,
            })
            .collect()
    }

    fn rule_backend_refs(&self) -> Vec<Vec<BackendRef>> {
        self.spec
            .rules
            .iter()
            .flatten()
            .map(|rule| {
                rule.backend_refs
                    .iter()
                    .flatten()
                    .map(|b| BackendRef {
                        group: b.group.clone(),
                        kind: b.kind.clone(),
                        name: b.name.clone(),
                        namespace: b.namespace.clone(),
                        port: b.port,
                        weight: b.weight,
                    })
                    .collect()
            })
            .collect()
    }

    fn parent_statuses(&self) -> Vec<ParentStatus> {
        self.status
            .iter()
            .flat_map(|s| s.parents.iter())
            .map(|p| ParentStatus {
                parent_ref: ParentRef {
                    group: p.parent_ref.group.clone(),
                    kind: p.parent_ref.kind.clone(),
                    namespace: p.parent_ref.namespace.clone(),
                    name: p.parent_ref.name.clone(),
                    section_name: p.parent_ref.section_name.clone(),
                    port: p.parent_ref.port,
                },
                controller_name: p.controller_name.clone(),
                conditions: opt_vec!(p.conditions),
            })
            .collect()
    }

    fn merge_parent_condition(&mut self, parent_ref: &ParentRef, condition: Condition) {
        if self.status.is_none() {
            self.status = Some(HTTPRouteStatus { parents: vec![] });
        }
        let status = self.status.as_mut().unwrap();
        for parent in status.parents.iter_mut() {
            let existing = ParentRef {
                group: parent.parent_ref.group.clone(),
                kind: parent.parent_ref.kind.clone(),
                namespace: parent.parent_ref.namespace.clone(),
                name: parent.parent_ref.name.clone(),
                section_name: parent.parent_ref.section_name.clone(),
                port: parent.parent_ref.port,
            };
            if existing == *parent_ref {
                merge_condition(parent.conditions.get_or_insert_with(Vec::new), condition);
                return;
            }
        }
        status.parents.push(HTTPRouteStatusParents {
            parent_ref: HTTPRouteStatusParentsParentRef {
                group: parent_ref.group.clone(),
                kind: parent_ref.kind.clone(),
                namespace: parent_ref.namespace.clone(),
                name: parent_ref.name.clone(),
                section_name: parent_ref.section_name.clone(),
                port: parent_ref.port,
            },
            controller_name: GATEWAY_CLASS_CONTROLLER_NAME.to_string(),
            conditions: Some(vec![condition]),
        });
    }

    fn status_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.status).unwrap_or(serde_json::Value::Null)
    }
}

impl RouteInfo for GRPCRoute {
    fn route_kind(&self) -> RouteKind {
        RouteKind::Grpc
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn hostnames(&self) -> Vec<String> {
        opt_vec!(self.spec.hostnames)
    }

    fn parent_refs(&self) -> Vec<ParentRef> {
        self.spec
            .parent_refs
            .iter()
            .flatten()
            .map(|r| ParentRef {
                group: r.group.clone(),
                kind: r.kind.clone(),
                namespace: r.namespace.clone(),
                name: r.name.clone(),
                section_name: r.section_name.clone(),
                port: r.port,
            })
            .collect()
    }

    fn rule_backend_refs(&self) -> Vec<Vec<BackendRef>> {
        self.spec
            .rules
            .iter()
            .flatten()
            .map(|rule| {
                rule.backend_refs
                    .iter()
                    .flatten()
                    .map(|b| BackendRef {
                        group: b.group.clone(),
                        kind: b.kind.clone(),
                        name: b.name.clone(),
                        namespace: b.namespace.clone(),
                        port: b.port,
                        weight: b.weight,
                    })
                    .collect()
            })
            .collect()
    }

    fn parent_statuses(&self) -> Vec<ParentStatus> {
        self.status
            .iter()
            .flat_map(|s| s.parents.iter())
            .map(|p| ParentStatus {
                parent_ref: ParentRef {
                    group: p.parent_ref.group.clone(),
                    kind: p.parent_ref.kind.clone(),
                    namespace: p.parent_ref.namespace.clone(),
                    name: p.parent_ref.name.clone(),
                    section_name: p.parent_ref.section_name.clone(),
                    port: p.parent_ref.port,
                },
                controller_name: p.controller_name.clone(),
                conditions: opt_vec!(p.conditions),
            })
            .collect()
    }

    fn merge_parent_condition(&mut self, parent_ref: &ParentRef, condition: Condition) {
        if self.status.is_none() {
            self.status = Some(GRPCRouteStatus { parents: vec![] });
        }
        let status = self.status.as_mut().unwrap();
        for parent in status.parents.iter_mut() {
            let existing = ParentRef {
                group: parent.parent_ref.group.clone(),
                kind: parent.parent_ref.kind.clone(),
                namespace: parent.parent_ref.namespace.clone(),
                name: parent.parent_ref.name.clone(),
                section_name: parent.parent_ref.section_name.clone(),
                port: parent.parent_ref.port,
            };
            if existing == *parent_ref {
                merge_condition(parent.conditions.get_or_insert_with(Vec::new), condition);
                return;
            }
        }
        status.parents.push(GRPCRouteStatusParents {
            parent_ref: GRPCRouteStatusParentsParentRef {
                group: parent_ref.group.clone(),
                kind: parent_ref.kind.clone(),
                namespace: parent_ref.namespace.clone(),
                name: parent_ref.name.clone(),
                section_name: parent_ref.section_name.clone(),
                port: parent_ref.port,
            },
            controller_name: GATEWAY_CLASS_CONTROLLER_NAME.to_string(),
            conditions: Some(vec![condition]),
        });
    }

    fn status_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.status).unwrap_or(serde_json::Value::Null)
    }
}

impl RouteInfo for TCPRoute {
    fn route_kind(&self) -> RouteKind {
        RouteKind::Tcp
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn hostnames(&self) -> Vec<String> {
        Vec::new()
    }

    fn parent_refs(&self) -> Vec<ParentRef> {
        self.spec
            .parent_refs
            .iter()
            .flatten()
            .map(|r| ParentRef {
                group: r.group.clone(),
                kind: r.kind.clone(),
                namespace: r.namespace.clone(),
                name: r.name.clone(),
                section_name: r.section_name.clone(),
                port: r.port,
            })
            .collect()
    }

    fn rule_backend_refs(&self) -> Vec<Vec<BackendRef>> {
        self.spec
            .rules
            .iter()
            .map(|rule| {
                rule.backend_refs
                    .iter()
                    .flatten()
                    .map(|b| BackendRef {
                        group: b.group.clone(),
                        kind: b.kind.clone(),
                        name: b.name.clone(),
                        namespace: b.namespace.clone(),
                        port: b.port,
                        weight: b.weight,
                    })
                    .collect()
            })
            .collect()
    }

    fn parent_statuses(&self) -> Vec<ParentStatus> {
        self.status
            .iter()
            .flat_map(|s| s.parents.iter())
            .map(|p| ParentStatus {
                parent_ref: ParentRef {
                    group: p.parent_ref.group.clone(),
                    kind: p.parent_ref.kind.clone(),
                    namespace: p.parent_ref.namespace.clone(),
                    name: p.parent_ref.name.clone(),
                    section_name: p.parent_ref.section_name.clone(),
                    port: p.parent_ref.port,
                },
                controller_name: p.controller_name.clone(),
                conditions: opt_vec!(p.conditions),
            })
            .collect()
    }

    fn merge_parent_condition(&mut self, parent_ref: &ParentRef, condition: Condition) {
        if self.status.is_none() {
            self.status = Some(TCPRouteStatus { parents: vec![] });
        }
        let status = self.status.as_mut().unwrap();
        for parent in status.parents.iter_mut() {
            let existing = ParentRef {
                group: parent.parent_ref.group.clone(),
                kind: parent.parent_ref.kind.clone(),
                namespace: parent.parent_ref.namespace.clone(),
                name: parent.parent_ref.name.clone(),
                section_name: parent.parent_ref.section_name.clone(),
                port: parent.parent_ref.port,
            };
            if existing == *parent_ref {
                merge_condition(parent.conditions.get_or_insert_with(Vec::new), condition);
                return;
            }
        }
        status.parents.push(TCPRouteStatusParents {
            parent_ref: TCPRouteStatusParentsParentRef {
                group: parent_ref.group.clone(),
                kind: parent_ref.kind.clone(),
                namespace: parent_ref.namespace.clone(),
                name: parent_ref.name.clone(),
                section_name: parent_ref.section_name.clone(),
                port: parent_ref.port,
            },
            controller_name: GATEWAY_CLASS_CONTROLLER_NAME.to_string(),
            conditions: Some(vec![condition]),
        });
    }

    fn status_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.status).unwrap_or(serde_json::Value::Null)
    }
}

impl RouteInfo for TLSRoute {
    fn route_kind(&self) -> RouteKind {
        RouteKind::Tls
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn hostnames(&self) -> Vec<String> {
        opt_vec!(self.spec.hostnames)
    }

    fn parent_refs(&self) -> Vec<ParentRef> {
        self.spec
            .parent_refs
            .iter()
            .flatten()
            .map(|r| ParentRef {
                group: r.group.clone(),
                kind: r.kind.clone(),
                namespace: r.namespace.clone(),
                name: r.name.clone(),
                section_name: r.section_name.clone(),
                port: r.port,
            })
            .collect()
    }

    fn rule_backend_refs(&self) -> Vec<Vec<BackendRef>> {
        self.spec
            .rules
            .iter()
            .map(|rule| {
                rule.backend_refs
                    .iter()
                    .flatten()
                    .map(|b| BackendRef {
                        group: b.group.clone(),
                        kind: b.kind.clone(),
                        name: b.name.clone(),
                        namespace: b.namespace.clone(),
                        port: b.port,
                        weight: b.weight,
                    })
                    .collect()
            })
            .collect()
    }

    fn parent_statuses(&self) -> Vec<ParentStatus> {
        self.status
            .iter()
            .flat_map(|s| s.parents.iter())
            .map(|p| ParentStatus {
                parent_ref: ParentRef {
                    group: p.parent_ref.group.clone(),
                    kind: p.parent_ref.kind.clone(),
                    namespace: p.parent_ref.namespace.clone(),
                    name: p.parent_ref.name.clone(),
                    section_name: p.parent_ref.section_name.clone(),
                    port: p.parent_ref.port,
                },
                controller_name: p.controller_name.clone(),
                conditions: opt_vec!(p.conditions),
            })
            .collect()
    }

    fn merge_parent_condition(&mut self, parent_ref: &ParentRef, condition: Condition) {
        if self.status.is_none() {
            self.status = Some(TLSRouteStatus { parents: vec![] });
        }
        let status = self.status.as_mut().unwrap();
        for parent in status.parents.iter_mut() {
            let existing = ParentRef {
                group: parent.parent_ref.group.clone(),
                kind: parent.parent_ref.kind.clone(),
                namespace: parent.parent_ref.namespace.clone(),
                name: parent.parent_ref.name.clone(),
                section_name: parent.parent_ref.section_name.clone(),
                port: parent.parent_ref.port,
            };
            if existing == *parent_ref {
                merge_condition(parent.conditions.get_or_insert_with(Vec::new), condition);
                return;
            }
        }
        status.parents.push(TLSRouteStatusParents {
            parent_ref: TLSRouteStatusParentsParentRef {
                group: parent_ref.group.clone(),
                kind: parent_ref.kind.clone(),
                namespace: parent_ref.namespace.clone(),
                name: parent_ref.name.clone(),
                section_name: parent_ref.section_name.clone(),
                port: parent_ref.port,
            },
            controller_name: GATEWAY_CLASS_CONTROLLER_NAME.to_string(),
            conditions: Some(vec![condition]),
        });
    }

    fn status_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.status).unwrap_or(serde_json::Value::Null)
    }
}

impl RouteInfo for UDPRoute {
    fn route_kind(&self) -> RouteKind {
        RouteKind::Udp
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn hostnames(&self) -> Vec<String> {
        Vec::new()
    }

    fn parent_refs(&self) -> Vec<ParentRef> {
        self.spec
            .parent_refs
            .iter()
            .flatten()
            .map(|r| ParentRef {
                group: r.group.clone(),
                kind: r.kind.clone(),
                namespace: r.namespace.clone(),
                name: r.name.clone(),
                section_name: r.section_name.clone(),
                port: r.port,
            })
            .collect()
    }

    fn rule_backend_refs(&self) -> Vec<Vec<BackendRef>> {
        self.spec
            .rules
            .iter()
            .map(|rule| {
                rule.backend_refs
                    .iter()
                    .flatten()
                    .map(|b| BackendRef {
                        group: b.group.clone(),
                        kind: b.kind.clone(),
                        name: b.name.clone(),
                        namespace: b.namespace.clone(),
                        port: b.port,
                        weight: b.weight,
                    })
                    .collect()
            })
            .collect()
    }

    fn parent_statuses(&self) -> Vec<ParentStatus> {
        self.status
            .iter()
            .flat_map(|s| s.parents.iter())
            .map(|p| ParentStatus {
                parent_ref: ParentRef {
                    group: p.parent_ref.group.clone(),
                    kind: p.parent_ref.kind.clone(),
                    namespace: p.parent_ref.namespace.clone(),
                    name: p.parent_ref.name.clone(),
                    section_name: p.parent_ref.section_name.clone(),
                    port: p.parent_ref.port,
                },
                controller_name: p.controller_name.clone(),
                conditions: opt_vec!(p.conditions),
            })
            .collect()
    }

    fn merge_parent_condition(&mut self, parent_ref: &ParentRef, condition: Condition) {
        if self.status.is_none() {
            self.status = Some(UDPRouteStatus { parents: vec![] });
        }
        let status = self.status.as_mut().unwrap();
        for parent in status.parents.iter_mut() {
            let existing = ParentRef {
                group: parent.parent_ref.group.clone(),
                kind: parent.parent_ref.kind.clone(),
                namespace: parent.parent_ref.namespace.clone(),
                name: parent.parent_ref.name.clone(),
                section_name: parent.parent_ref.section_name.clone(),
                port: parent.parent_ref.port,
            };
            if existing == *parent_ref {
                merge_condition(parent.conditions.get_or_insert_with(Vec::new), condition);
                return;
            }
        }
        status.parents.push(UDPRouteStatusParents {
            parent_ref: UDPRouteStatusParentsParentRef {
                group: parent_ref.group.clone(),
                kind: parent_ref.kind.clone(),
                namespace: parent_ref.namespace.clone(),
                name: parent_ref.name.clone(),
                section_name: parent_ref.section_name.clone(),
                port: parent_ref.port,
            },
            controller_name: GATEWAY_CLASS_CONTROLLER_NAME.to_string(),
            conditions: Some(vec![condition]),
        });
    }

    fn status_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.status).unwrap_or(serde_json::Value::Null)
    }
}
