mod cli;

use std::fs;
use std::time::Duration;

use clap::Parser;
use eyre::{eyre, WrapErr};

use coinrpc_core::rpc::RawCommand;
use coinrpc_core::{CallContext, Client, ConnConfig};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let config = build_config(&args)?;
    let host = config.host.clone();
    let client = Client::new(config).context("build RPC client")?;

    let params: Vec<serde_json::Value> = args
        .params
        .iter()
        .map(String::as_str)
        .map(parse_param)
        .collect();
    let command = RawCommand::new(args.method.clone(), params);
    let ctx = CallContext::background().with_timeout(Duration::from_secs(args.timeout_secs));

    let reply = tokio::select! {
        reply = client.call(&ctx, &command) => reply,
        res = tokio::signal::ctrl_c() => {
            res.context("listen for ctrl-c")?;
            tracing::info!("interrupted");
            client.shutdown();
            client.wait_for_shutdown().await;
            return Err(eyre!("interrupted before `{}` completed", args.method));
        }
    };

    client.shutdown();
    client.wait_for_shutdown().await;

    let result = reply.map_err(|err| {
        let message = format_rpc_connect_error(&host, &err.to_string());
        eyre!(message).wrap_err(format!("while calling `{}`", args.method))
    })?;

    let rendered = match &result {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).context("render result")?,
    };
    println!("{rendered}");
    Ok(())
}

fn build_config(args: &cli::Cli) -> eyre::Result<ConnConfig> {
    let mut config = ConnConfig::http_post(args.host.clone());
    config.user = args.rpc_user.clone();
    config.pass = args.rpc_pass.clone();
    if let Some(path) = &args.cookie_file {
        config = config.with_cookie_file(path);
    }
    config.disable_tls = !args.tls;
    config.proxy = args.proxy.clone();
    if let Some(path) = &args.cert_file {
        let pem = fs::read_to_string(path)
            .with_context(|| format!("read certificate file `{}`", path.display()))?;
        config.certificates = Some(pem);
    }
    config.validate().context("invalid connection settings")?;
    Ok(config)
}

/// Numbers, booleans, arrays and objects pass through as JSON; anything
/// else is sent as a string, so block hashes need no quoting.
fn parse_param(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_owned()))
}

fn format_rpc_connect_error(host: &str, source_error: &str) -> String {
    let mut lines = vec![
        format!("RPC call to `{host}` failed"),
        format!("RPC error: {source_error}"),
    ];

    if source_error.contains("dns error") || source_error.contains("failed to lookup address") {
        lines.push(
            "hint: hostname resolution failed; verify the host name and your DNS/network".into(),
        );
    } else if source_error.contains("tls")
        || source_error.contains("certificate")
        || source_error.contains("SSL")
    {
        lines.push(
            "hint: TLS handshake failed; verify --cert-file and that the node serves HTTPS".into(),
        );
    } else if source_error.contains("authentication failure") {
        lines.push(
            "hint: credentials rejected; verify --rpc-user/--rpc-pass or --cookie-file".into(),
        );
    } else if source_error.contains("status code: 404") {
        lines.push("hint: endpoint path is invalid; verify the path part of --host".into());
    } else if source_error.contains("error sending request for url") {
        lines.push(
            "hint: request could not be sent; verify the node is running and reachable".into(),
        );
    } else if source_error.contains("request deadline exceeded") {
        lines.push("hint: no reply in time; raise --timeout-secs for slow calls".into());
    }

    lines.join("\n")
}
