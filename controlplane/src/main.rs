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

use std::path::PathBuf;

use clap::Parser;
use controlplane::dataplane::DataplaneConfig;
use controlplane::{consts, crds, Context};
use futures::future::BoxFuture;
use futures::FutureExt;
use kube::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Gateway API control plane for Caddy data planes")]
struct Args {
    /// Client certificate presented to the data-plane admin API.
    #[arg(long, default_value = consts::DEFAULT_TLS_CERTIFICATE_PATH)]
    tls_certificate_path: PathBuf,

    /// Private key for the client certificate.
    #[arg(long, default_value = consts::DEFAULT_TLS_PRIVATE_KEY_PATH)]
    tls_private_key_path: PathBuf,

    /// Trust root for verifying data-plane serving certificates.
    #[arg(long, default_value = consts::DEFAULT_TLS_CA_PATH)]
    tls_certificate_authority_path: PathBuf,

    /// Port of the admin-API authorizer on each data-plane pod.
    #[arg(long, default_value_t = consts::DEFAULT_DATAPLANE_ADMIN_PORT)]
    dataplane_admin_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let client = Client::try_default().await?;

    // Fail fast when the required Gateway API CRDs are not installed.
    let api_info = crds::check_crds(&client).await?;

    let dataplane = DataplaneConfig::from_files(
        &args.tls_certificate_path,
        &args.tls_private_key_path,
        &args.tls_certificate_authority_path,
        args.dataplane_admin_port,
    )?;

    let ctx = Context {
        client,
        dataplane,
        api_info: api_info.clone(),
    };

    let mut controllers: Vec<(&str, BoxFuture<'static, controlplane::Result<()>>)> = vec![
        ("GatewayClass", controlplane::gatewayclass_controller(ctx.clone()).boxed()),
        ("Gateway", controlplane::gateway_controller(ctx.clone()).boxed()),
        ("HTTPRoute", controlplane::httproute_controller(ctx.clone()).boxed()),
    ];
    if api_info.has_kind("GRPCRoute") {
        controllers.push(("GRPCRoute", controlplane::grpcroute_controller(ctx.clone()).boxed()));
    }
    if api_info.has_kind("TCPRoute") {
        controllers.push(("TCPRoute", controlplane::tcproute_controller(ctx.clone()).boxed()));
    }
    if api_info.has_kind("TLSRoute") {
        controllers.push(("TLSRoute", controlplane::tlsroute_controller(ctx.clone()).boxed()));
    }
    if api_info.has_kind("UDPRoute") {
        controllers.push(("UDPRoute", controlplane::udproute_controller(ctx.clone()).boxed()));
    }

    let (names, tasks): (Vec<_>, Vec<_>) = controllers.into_iter().unzip();
    info!(controllers = ?names, "starting controllers");

    let mut failed = false;
    for (name, result) in names.iter().zip(futures::future::join_all(tasks).await) {
        if let Err(err) = result {
            error!(controller = %name, "controller failed: {err}");
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }

    info!("shut down cleanly");
    Ok(())
}
