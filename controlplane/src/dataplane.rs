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

//! Programs Caddy data-plane replicas over the mTLS admin API.
//!
//! Every replica receives the full configuration document; a replica that
//! fails to apply it is logged and retried on the next reconcile.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use gateway_api::apis::standard::gateways::Gateway;
use k8s_openapi::api::core::v1::Endpoints;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use tracing::{info, warn};

use crate::consts::OWNING_GATEWAY_LABEL;
use crate::{Error, NamespacedName, Result};

// Client-side mTLS material for the admin-API channel, loaded once at
// startup. ServerName differs per replica, so each request builds a client
// from these shared parts.
#[derive(Clone)]
pub struct DataplaneConfig {
    identity: reqwest::Identity,
    root_ca: reqwest::Certificate,
    admin_port: u16,
}

impl DataplaneConfig {
    pub fn from_files(
        certificate_path: &Path,
        private_key_path: &Path,
        ca_path: &Path,
        admin_port: u16,
    ) -> Result<Self> {
        let mut identity_pem = std::fs::read(certificate_path)?;
        identity_pem.extend(std::fs::read(private_key_path)?);
        let identity = reqwest::Identity::from_pem(&identity_pem)
            .map_err(|err| Error::DataplaneError(format!("invalid client certificate: {err}")))?;

        let root_ca = reqwest::Certificate::from_pem(&std::fs::read(ca_path)?)
            .map_err(|err| Error::DataplaneError(format!("invalid ca certificate: {err}")))?;

        Ok(Self {
            identity,
            root_ca,
            admin_port,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_pem(identity_pem: &[u8], ca_pem: &[u8], admin_port: u16) -> Result<Self> {
        Ok(Self {
            identity: reqwest::Identity::from_pem(identity_pem)
                .map_err(|err| Error::DataplaneError(format!("invalid client certificate: {err}")))?,
            root_ca: reqwest::Certificate::from_pem(ca_pem)
                .map_err(|err| Error::DataplaneError(format!("invalid ca certificate: {err}")))?,
            admin_port,
        })
    }

    // Builds an HTTP client that dials the replica's IP while performing TLS
    // against its pod identity, `<pod>.<namespace>`.
    fn client_for_replica(&self, ip: IpAddr, server_name: &str) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(self.root_ca.clone())
            .identity(self.identity.clone())
            .resolve(server_name, SocketAddr::new(ip, self.admin_port))
            .build()
            .map_err(|err| Error::DataplaneError(format!("failed to build http client: {err}")))
    }

    fn load_url(&self, server_name: &str) -> String {
        format!("https://{server_name}:{}/load", self.admin_port)
    }
}

// The result of programming one replica.
#[derive(Debug)]
pub struct ReplicaOutcome {
    pub ip: String,
    pub target: NamespacedName,
    pub result: Result<(), String>,
}

// Pushes the configuration to every data-plane replica of the Gateway in
// parallel. Returns NoResourcesError when no labeled Endpoints with
// addresses exist; individual replica failures are recorded per outcome and
// never abort the other replicas.
pub async fn program(
    client: &Client,
    config: &DataplaneConfig,
    gateway: &Gateway,
    payload: &[u8],
) -> Result<Vec<ReplicaOutcome>> {
    let gateway_name = gateway.name_any();
    let endpoints_api: Api<Endpoints> = Api::all(client.clone());
    let endpoints = endpoints_api
        .list(&ListParams::default().labels(&format!("{OWNING_GATEWAY_LABEL}={gateway_name}")))
        .await
        .map_err(Error::KubeError)?;

    let endpoints = endpoints
        .items
        .into_iter()
        .next()
        .ok_or_else(|| Error::NoResourcesError(format!("no endpoints labeled for gateway {gateway_name}")))?;
    let subset = endpoints
        .subsets
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| Error::NoResourcesError(format!("endpoints for gateway {gateway_name} have no subsets")))?;
    let addresses = subset.addresses.unwrap_or_default();
    if addresses.is_empty() {
        return Err(Error::NoResourcesError(format!(
            "endpoints for gateway {gateway_name} have no addresses"
        )));
    }

    let mut tasks = Vec::new();
    for address in addresses {
        let Some(target_ref) = address.target_ref else {
            warn!(ip = %address.ip, "endpoint address has no target pod reference");
            continue;
        };
        let target = NamespacedName {
            name: target_ref.name.unwrap_or_default(),
            namespace: target_ref.namespace.unwrap_or_default(),
        };
        let ip = address.ip.clone();
        tasks.push(async move {
            let result = program_replica(config, &ip, &target, payload).await;
            match &result {
                Ok(()) => info!(ip = %ip, target = %target, "successfully programmed Caddy instance"),
                Err(message) => {
                    warn!(ip = %ip, target = %target, error = %message, "error programming Caddy instance");
                }
            }
            ReplicaOutcome {
                ip,
                target,
                result,
            }
        });
    }

    Ok(futures::future::join_all(tasks).await)
}

async fn program_replica(
    config: &DataplaneConfig,
    ip: &str,
    target: &NamespacedName,
    payload: &[u8],
) -> Result<(), String> {
    let ip: IpAddr = ip
        .parse()
        .map_err(|err| format!("invalid endpoint address: {err}"))?;
    let server_name = replica_server_name(target);

    let client = config
        .client_for_replica(ip, &server_name)
        .map_err(|err| err.to_string())?;
    let response = client
        .post(config.load_url(&server_name))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(payload.to_vec())
        .send()
        .await
        .map_err(|err| err.to_string())?;

    let status = response.status();
    if !status.is_success() {
        // Keep the body for diagnosis.
        let body = response.text().await.unwrap_or_default();
        return Err(format!("unexpected status {status}: {body}"));
    }
    // Drain the body so the connection can be reused.
    let _ = response.bytes().await;
    Ok(())
}

// The TLS ServerName presented for a replica, matching the per-pod
// certificates issued to the data plane.
pub fn replica_server_name(target: &NamespacedName) -> String {
    format!("{}.{}", target.name, target.namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_name_is_pod_dot_namespace() {
        let target = NamespacedName {
            name: "caddy-0".to_string(),
            namespace: "caddy-system".to_string(),
        };
        assert_eq!(replica_server_name(&target), "caddy-0.caddy-system");
    }

    fn self_signed_pem(names: Vec<String>) -> (String, String) {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(names).expect("generate certificate");
        (cert.pem(), key_pair.serialize_pem())
    }

    #[test]
    fn builds_replica_clients_from_pem_material() {
        let (client_cert, client_key) = self_signed_pem(vec!["controller".to_string()]);
        let (ca_cert, _) = self_signed_pem(vec!["ca".to_string()]);

        let mut identity = client_cert.into_bytes();
        identity.extend(client_key.into_bytes());
        let config = DataplaneConfig::from_pem(&identity, ca_cert.as_bytes(), 2021)
            .expect("valid mtls material");

        let target = NamespacedName {
            name: "caddy-0".to_string(),
            namespace: "caddy-system".to_string(),
        };
        let server_name = replica_server_name(&target);
        assert_eq!(config.load_url(&server_name), "https://caddy-0.caddy-system:2021/load");

        config
            .client_for_replica("10.1.2.3".parse().unwrap(), &server_name)
            .expect("client builds");
    }

    #[test]
    fn loading_from_files_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (client_cert, client_key) = self_signed_pem(vec!["controller".to_string()]);
        let (ca_cert, _) = self_signed_pem(vec!["ca".to_string()]);

        let cert_path = dir.path().join("tls.crt");
        let key_path = dir.path().join("tls.key");
        let ca_path = dir.path().join("ca.crt");
        std::fs::write(&cert_path, client_cert).unwrap();
        std::fs::write(&key_path, client_key).unwrap();
        std::fs::write(&ca_path, ca_cert).unwrap();

        DataplaneConfig::from_files(&cert_path, &key_path, &ca_path, 2021)
            .expect("loads mtls material from disk");
    }

    #[test]
    fn garbage_pem_is_rejected() {
        let err = DataplaneConfig::from_pem(b"not pem", b"also not pem", 2021);
        assert!(err.is_err());
    }
}
