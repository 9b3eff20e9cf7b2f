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

//! Cross-namespace reference permission checks backed by ReferenceGrants.

use gateway_api::apis::standard::referencegrants::ReferenceGrant;

use crate::consts::GATEWAY_GROUP;
use crate::routes::BackendRef;

// Returns true if the backend reference from a route of the given kind is
// allowed by the reference grants. Only Service backends are supported.
pub fn is_backend_reference_allowed(
    originating_namespace: &str,
    backend: &BackendRef,
    route_kind: &str,
    grants: &[ReferenceGrant],
) -> bool {
    if !backend.is_service() {
        return false;
    }
    is_reference_allowed(
        originating_namespace,
        &backend.name,
        backend.namespace.as_deref(),
        GATEWAY_GROUP,
        route_kind,
        "",
        "Service",
        grants,
    )
}

// Evaluates whether `from` (group+kind in originating_namespace) may
// reference `to` (group+kind+name in namespace) given the grants. Same
// namespace is always allowed; otherwise the first matching grant in the
// target namespace wins.
#[allow(clippy::too_many_arguments)]
pub fn is_reference_allowed(
    originating_namespace: &str,
    name: &str,
    namespace: Option<&str>,
    from_group: &str,
    from_kind: &str,
    to_group: &str,
    to_kind: &str,
    grants: &[ReferenceGrant],
) -> bool {
    let namespace = match namespace {
        Some(ns) if !ns.is_empty() => ns,
        _ => originating_namespace,
    };
    if originating_namespace == namespace {
        // Same namespace is always allowed.
        return true;
    }

    for grant in grants {
        if grant.metadata.namespace.as_deref() != Some(namespace) {
            continue;
        }
        let from_matches = grant.spec.from.iter().any(|from| {
            from.group == from_group && from.kind == from_kind && from.namespace == originating_namespace
        });
        if !from_matches {
            continue;
        }
        let to_matches = grant.spec.to.iter().any(|to| {
            to.group == to_group
                && to.kind == to_kind
                && to.name.as_deref().map_or(true, |n| n.is_empty() || n == name)
        });
        if to_matches {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(namespace: &str, from_kind: &str, from_namespace: &str, to_name: Option<&str>) -> ReferenceGrant {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "gateway.networking.k8s.io/v1beta1",
            "kind": "ReferenceGrant",
            "metadata": {"name": "grant", "namespace": namespace},
            "spec": {
                "from": [{
                    "group": "gateway.networking.k8s.io",
                    "kind": from_kind,
                    "namespace": from_namespace,
                }],
                "to": [{
                    "group": "",
                    "kind": "Service",
                    "name": to_name,
                }],
            },
        }))
        .expect("valid reference grant fixture")
    }

    fn backend(name: &str, namespace: Option<&str>) -> BackendRef {
        BackendRef {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            port: Some(8080),
            ..Default::default()
        }
    }

    #[test]
    fn same_namespace_is_always_allowed() {
        // No grants are consulted for same-namespace references.
        assert!(is_backend_reference_allowed(
            "app",
            &backend("svc", Some("app")),
            "HTTPRoute",
            &[],
        ));
        assert!(is_backend_reference_allowed(
            "app",
            &backend("svc", None),
            "HTTPRoute",
            &[],
        ));
    }

    #[test]
    fn cross_namespace_requires_a_grant() {
        let be = backend("svc", Some("backend"));
        assert!(!is_backend_reference_allowed("app", &be, "HTTPRoute", &[]));

        let grants = vec![grant("backend", "HTTPRoute", "app", None)];
        assert!(is_backend_reference_allowed("app", &be, "HTTPRoute", &grants));
    }

    #[test]
    fn grant_must_live_in_the_target_namespace() {
        let be = backend("svc", Some("backend"));
        let grants = vec![grant("app", "HTTPRoute", "app", None)];
        assert!(!is_backend_reference_allowed("app", &be, "HTTPRoute", &grants));
    }

    #[test]
    fn grant_kind_and_namespace_must_match_the_route() {
        let be = backend("svc", Some("backend"));
        let grants = vec![grant("backend", "TCPRoute", "app", None)];
        assert!(!is_backend_reference_allowed("app", &be, "HTTPRoute", &grants));

        let grants = vec![grant("backend", "HTTPRoute", "other", None)];
        assert!(!is_backend_reference_allowed("app", &be, "HTTPRoute", &grants));
    }

    #[test]
    fn named_grant_only_covers_that_service() {
        let grants = vec![grant("backend", "HTTPRoute", "app", Some("svc"))];
        assert!(is_backend_reference_allowed(
            "app",
            &backend("svc", Some("backend")),
            "HTTPRoute",
            &grants,
        ));
        assert!(!is_backend_reference_allowed(
            "app",
            &backend("other", Some("backend")),
            "HTTPRoute",
            &grants,
        ));
    }

    #[test]
    fn non_service_backends_are_never_allowed() {
        let be = BackendRef {
            kind: Some("Bucket".to_string()),
            name: "svc".to_string(),
            namespace: Some("backend".to_string()),
            ..Default::default()
        };
        assert!(!is_backend_reference_allowed("app", &be, "HTTPRoute", &[]));
    }
}
