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

pub mod backend_tls_policy;
pub mod caddy;
pub mod consts;
pub mod crds;
pub mod dataplane;
mod gateway_controller;
mod gateway_utils;
mod gatewayclass_controller;
mod gatewayclass_utils;
mod grpcroute_controller;
mod httproute_controller;
pub mod reference_grants;
pub mod routes;
mod route_utils;
mod tcproute_controller;
mod tlsroute_controller;
mod traits;
mod udproute_controller;

use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;

use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::reflector::{self, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

pub use gateway_controller::controller as gateway_controller;
pub use gatewayclass_controller::controller as gatewayclass_controller;
pub use grpcroute_controller::controller as grpcroute_controller;
pub use httproute_controller::controller as httproute_controller;
pub use tcproute_controller::controller as tcproute_controller;
pub use tlsroute_controller::controller as tlsroute_controller;
pub use udproute_controller::controller as udproute_controller;

// Context for our reconcilers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// mTLS material and port for the data-plane admin API
    pub dataplane: dataplane::DataplaneConfig,
    /// Installed Gateway API CRDs discovered at startup
    pub api_info: crds::GatewayApiInfo,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    KubeError(#[from] kube::Error),
    #[error("invalid configuration: `{0}`")]
    InvalidConfigError(String),
    #[error("error querying Gateway API CRDs: `{0}`; are the CRDs installed?")]
    CRDNotFoundError(#[source] kube::Error),
    #[error("missing required crds: {}", .0.join(", "))]
    MissingCrdsError(Vec<String>),
    #[error("error generating Caddy config: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("dataplane error: {0}")]
    DataplaneError(String),
    #[error("no data-plane endpoints found: {0}")]
    NoResourcesError(String),
    #[error("i/o error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("missing resource namespace")]
    MissingResourceNamespace,
    #[error("missing resource name")]
    MissingResourceName,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Hash, Eq, PartialEq)]
pub struct NamespacedName {
    pub name: String,
    pub namespace: String,
}

impl Display for NamespacedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.namespace.as_str())?;
        f.write_str("/")?;
        f.write_str(self.name.as_str())
    }
}

impl Debug for NamespacedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

pub trait NamespaceName {
    fn namespace(&self) -> std::result::Result<&str, Error>;
    fn name(&self) -> std::result::Result<&str, Error>;
    fn namespaced_name(&self) -> std::result::Result<NamespacedName, Error>;
}

impl NamespaceName for ObjectMeta {
    fn namespace(&self) -> std::result::Result<&str, Error> {
        self.namespace
            .as_deref()
            .ok_or(Error::MissingResourceNamespace)
    }

    fn name(&self) -> std::result::Result<&str, Error> {
        self.name.as_deref().ok_or(Error::MissingResourceName)
    }

    fn namespaced_name(&self) -> std::result::Result<NamespacedName, Error> {
        Ok(NamespacedName {
            name: self.name()?.to_string(),
            namespace: self.namespace()?.to_string(),
        })
    }
}

// Spawns a cluster-wide reflector for the given kind and returns its store.
// Watch mappers use these stores to compute the set of Gateways or Routes
// affected by a secondary object event.
pub(crate) fn spawn_reflector<K>(client: Client) -> Store<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Clone + Eq + Hash + Unpin,
{
    let api: Api<K> = Api::all(client);
    let (reader, writer) = reflector::store();
    let stream = reflector::reflector(writer, watcher(api, watcher::Config::default().any_semantic()));
    tokio::spawn(async move {
        let mut stream = std::pin::pin!(stream.applied_objects());
        while let Some(res) = stream.next().await {
            if let Err(error) = res {
                warn!("reflector watch error: {error:?}");
            }
        }
    });
    reader
}
