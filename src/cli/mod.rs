//! Command-line interface for Grantry
//!
//! `serve` runs the HTTP server; `client` manages the client registry;
//! `gc` purges expired grants and tokens once.

use crate::auth::{AuthorizationProvider, ClientRegistration};
use crate::config::Config;
use crate::model::Client;
use crate::storage::Storage;
use crate::{GrantryError, Result};
use chrono::Utc;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::sync::Arc;

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();
    dispatch(&matches).await
}

/// Build the command tree
pub fn build_cli() -> Command {
    Command::new("grantry")
        .about("Grantry - OAuth2 authorization provider")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .help("Path to the config file (JSON or YAML)"),
        )
        .subcommand(
            Command::new("serve")
                .about("Start the HTTP server")
                .arg(Arg::new("host").long("host").help("Server host"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .short('p')
                        .value_parser(value_parser!(u16))
                        .help("Server port"),
                ),
        )
        .subcommand(
            Command::new("client")
                .about("Client registry management")
                .subcommand_required(true)
                .subcommand(
                    Command::new("create")
                        .about("Register a client")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(Arg::new("redirect-uri").long("redirect-uri").required(true))
                        .arg(
                            Arg::new("owner")
                                .long("owner")
                                .required(true)
                                .help("User id of the developer registering the client"),
                        )
                        .arg(Arg::new("description").long("description"))
                        .arg(Arg::new("website").long("website"))
                        .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
                )
                .subcommand(
                    Command::new("list")
                        .about("List clients")
                        .arg(Arg::new("owner").long("owner"))
                        .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
                )
                .subcommand(
                    Command::new("show")
                        .about("Show a client")
                        .arg(Arg::new("client-id").required(true).index(1))
                        .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete a client with its grants and tokens")
                        .arg(Arg::new("client-id").required(true).index(1)),
                ),
        )
        .subcommand(Command::new("gc").about("Purge expired grants and tokens"))
}

/// Run a parsed command line
pub async fn dispatch(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;

    match matches.subcommand() {
        Some(("serve", sub)) => handle_serve_command(sub, config).await,
        Some(("client", sub)) => {
            let storage = crate::storage::create_storage_from_config(&config.storage).await?;
            handle_client_command(sub, storage, &config).await
        }
        Some(("gc", _)) => {
            let storage = crate::storage::create_storage_from_config(&config.storage).await?;
            run_gc(storage.as_ref(), &config).await
        }
        _ => Err(GrantryError::validation(
            "No command specified. Use --help for usage information.",
        )),
    }
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(crate::constants::CONFIG_FILE_NAME);
    Config::load_with_env(path)
}

fn required<'a>(matches: &'a ArgMatches, key: &str) -> Result<&'a String> {
    matches
        .get_one::<String>(key)
        .ok_or_else(|| GrantryError::validation(format!("--{} is required", key)))
}

async fn handle_serve_command(matches: &ArgMatches, mut config: Config) -> Result<()> {
    let host = matches.get_one::<String>("host").cloned();
    let port = matches.get_one::<u16>("port").copied();

    if host.is_some() || port.is_some() {
        let http = config.http.get_or_insert_with(Default::default);
        if let Some(host) = host {
            http.host = host;
        }
        if let Some(port) = port {
            http.port = port;
        }
        config.validate()?;
    }

    crate::http::start_server(config).await
}

async fn handle_client_command(
    matches: &ArgMatches,
    storage: Arc<dyn Storage>,
    config: &Config,
) -> Result<()> {
    match matches.subcommand() {
        Some(("create", sub)) => {
            let provider = AuthorizationProvider::new(storage, config.provider_config());
            let client = provider
                .register_client(ClientRegistration {
                    name: required(sub, "name")?.clone(),
                    redirect_uri: required(sub, "redirect-uri")?.clone(),
                    owner_user_id: required(sub, "owner")?.clone(),
                    description: sub.get_one::<String>("description").cloned(),
                    website: sub.get_one::<String>("website").cloned(),
                })
                .await?;

            if sub.get_flag("json") {
                // The secret is only ever shown here
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "client_id": client.client_id,
                        "client_secret": client.client_secret,
                        "redirect_uri": client.redirect_uri,
                    }))?
                );
            } else {
                println!("\nClient registered");
                println!("Client ID:     {}", client.client_id);
                println!("Client Secret: {}", client.client_secret);
                println!("Redirect URI:  {}", client.redirect_uri);
            }
        }
        Some(("list", sub)) => {
            let clients = match sub.get_one::<String>("owner") {
                Some(owner) => storage.list_clients_by_owner(owner).await?,
                None => storage.list_clients().await?,
            };

            if sub.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&clients)?);
            } else if clients.is_empty() {
                println!("No clients registered");
            } else {
                for client in clients {
                    println!("  {} ({}) -> {}", client.name, client.client_id, client.redirect_uri);
                }
            }
        }
        Some(("show", sub)) => {
            let client_id = required(sub, "client-id")?;
            let client = storage
                .get_client(client_id)
                .await?
                .ok_or_else(|| GrantryError::not_found("Client", client_id.as_str()))?;

            if sub.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&client)?);
            } else {
                print_client(&client);
            }
        }
        Some(("delete", sub)) => {
            let client_id = required(sub, "client-id")?;
            storage.delete_client(client_id).await?;
            tracing::info!(client_id = %client_id, "Client deleted");
            println!("Client '{}' deleted", client_id);
        }
        _ => {
            return Err(GrantryError::validation("Unknown client command"));
        }
    }
    Ok(())
}

fn print_client(client: &Client) {
    println!("Client ID:    {}", client.client_id);
    println!("Name:         {}", client.name);
    println!("Redirect URI: {}", client.redirect_uri);
    println!("Owner:        {}", client.owner_user_id);
    if let Some(ref description) = client.description {
        println!("Description:  {}", description);
    }
    if let Some(ref website) = client.website {
        println!("Website:      {}", website);
    }
    println!("Created:      {}", client.created_at.to_rfc3339());
}

/// One purge pass: expired grants now, tokens past the retention window
pub async fn run_gc(storage: &dyn Storage, config: &Config) -> Result<()> {
    let now = Utc::now();
    let stats = storage
        .purge_expired(now, now - config.token_retention())
        .await?;

    tracing::info!(grants = stats.grants, tokens = stats.tokens, "Expired rows purged");
    println!(
        "Purged {} grant(s) and {} token(s)",
        stats.grants, stats.tokens
    );
    Ok(())
}
