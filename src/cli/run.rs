use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{self, WrapErr};

use crate::cli::LogFormat;
use crate::config;
use crate::mqtt::auth::StaticUserAuthenticator;
use crate::mqtt::broker::{BrokerConfig, MqttBroker};

#[derive(clap::Args, Clone, Debug)]
pub struct RunArgs {
    /// Set the format of log output.
    #[clap(short, long, default_value = "full")]
    pub log: LogFormat,

    /// The TCP socket address to listen for MQTT connections from clients.
    #[clap(short = 'L', long, default_value = "0.0.0.0:1883")]
    pub listen_addr: SocketAddr,

    /// Cap the QoS granted on subscriptions.
    ///
    /// Clients requesting a higher QoS are downgraded in the SUBACK.
    #[clap(long, default_value = "2", value_parser = clap::value_parser!(u8).range(0..=2))]
    pub max_subscription_qos: u8,

    /// Path to a TOML file of user credentials, as managed by `relaymq user`.
    /// Pass `-` to read it from stdin.
    #[clap(long)]
    pub users_file: Option<PathBuf>,

    /// Accept CONNECT packets that carry no username.
    #[clap(long)]
    pub allow_anonymous: bool,
}

pub fn main(args: RunArgs) -> crate::Result<()> {
    // File and stdio aren't truly async in Tokio so we might as well read the
    // config before we even start the runtime.
    let users = args
        .users_file
        .as_deref()
        .map(config::read_users)
        .transpose()?
        .unwrap_or_default();

    if users.users.is_empty() && !args.allow_anonymous {
        let command = std::env::args()
            .next()
            .unwrap_or_else(|| "relaymq".to_string());

        eyre::bail!(
            "Broker will be impossible to use in current configuration; \
            no user logins are configured and anonymous login is disallowed by default. \
            Run `{command} user add` to create at least one user login, \
            or pass `--allow-anonymous`.",
        )
    }

    let authenticator = Arc::new(StaticUserAuthenticator::new(users, args.allow_anonymous));

    main_async(args, authenticator)
}

// `#[tokio::main]` doesn't have to be attached to the actual `main()`, and it can accept args
#[tokio::main]
async fn main_async(
    args: RunArgs,
    authenticator: Arc<StaticUserAuthenticator>,
) -> crate::Result<()> {
    let maximum_subscription_qos = relaymq_protocol::qos(args.max_subscription_qos)
        .expect("BUG: clap validated the QoS range");

    let mut broker = MqttBroker::bind(
        args.listen_addr,
        BrokerConfig {
            authenticator: Some(authenticator),
            events: Arc::new(()),
            maximum_subscription_qos,
        },
    )
    .await?;

    tokio::select! {
        res = broker.run() => {
            res?;
        }
        res = tokio::signal::ctrl_c() => {
            res.wrap_err("error from ctrl_c() handler")?;
        }
    }

    tracing::info!(
        "Ctrl-C received; waiting for {} connections to close",
        broker.connections()
    );

    broker.shutdown().await
}
