//! Daemon entry point.

use std::{path::PathBuf, sync::Arc};

use anyhow::{ensure, Context};
use argh::FromArgs;
use keywarden_auth::{second_factor, PrimaryAuthenticator};
use keywarden_common::{config::AppConfig, shutdown::ShutdownChannel};
use keywarden_signer::CaState;
use keywardend::{
    keylookup::KeyLookup,
    server,
    state::{spawn_session_expirer, RuntimeState},
};
use tracing::info;

/// Short-lived SSH and X.509 credential issuance daemon.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, default = "PathBuf::from(\"config.yml\")")]
    config: PathBuf,
    /// enable verbose debug logging
    #[argh(switch)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    keywarden_logger::init(args.debug);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Could not build the tokio runtime")?;
    rt.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = AppConfig::load(&args.config)?;
    let host_identity = config.host_identity()?;
    info!("Host identity: {host_identity}");

    std::fs::create_dir_all(&config.base.data_directory).with_context(
        || {
            format!(
                "Could not create data directory: {}",
                config.base.data_directory.display()
            )
        },
    )?;

    let realm = config.base.kerberos_realm.as_deref();
    let raw_ca =
        std::fs::read(&config.base.ssh_ca_filename).with_context(|| {
            format!(
                "Could not read CA key file: {}",
                config.base.ssh_ca_filename.display()
            )
        })?;
    let ca = CaState::load(&raw_ca, &host_identity, realm)?;
    if ca.is_sealed() {
        ensure!(
            config.base.client_ca_filename.is_some(),
            "A sealed CA key requires client_ca_filename so an \
             administrative client can deliver the passphrase"
        );
        info!("CA key is sealed; waiting for an administrative unseal");
    }

    let webauthn = second_factor::build_webauthn(&host_identity, realm)?;
    let authenticator = PrimaryAuthenticator::new(&config);
    let state = Arc::new(RuntimeState::new(
        config,
        host_identity,
        authenticator,
        webauthn,
        KeyLookup::default_cmd(),
        ca,
    ));

    let shutdown = ShutdownChannel::new();
    spawn_signal_listener(shutdown.clone());
    let expirer = spawn_session_expirer(state.clone(), shutdown.clone());

    let result = server::serve(state, shutdown.clone()).await;

    // Let the expirer wind down before returning.
    shutdown.send();
    let _ = expirer.await;
    result
}

/// Translate SIGINT/SIGTERM into a shutdown signal.
fn spawn_signal_listener(shutdown: ShutdownChannel) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            )
            .expect("Could not install the SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("Received interrupt");
        }
        shutdown.send();
    });
}
