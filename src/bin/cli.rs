//! mk2ctl
//!
//! Command-line client for the MK2 monitor:
//! - Push readings and inspect the readings log
//! - Read or change the chart range
//! - Delete all readings
//! - Mint development tokens and print a default config

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mk2_monitor::auth::TokenVerifier;
use mk2_monitor::config::{generate_default_config, Config};
use mk2_monitor::dashboard::TableRow;
use mk2_monitor::storage::Reading;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mk2ctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Command-line client for the MK2 monitor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server URL
    #[arg(long, default_value = "http://localhost:8086", global = true)]
    pub api_url: String,

    /// Bearer token (or MK2_TOKEN)
    #[arg(long, env = "MK2_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Push a reading
    Push {
        /// Power supply, W
        #[arg(long)]
        power: Option<f64>,
        /// Energy diverted, W/h
        #[arg(long)]
        diverted: Option<f64>,
        /// Power at load, W
        #[arg(long)]
        load: Option<f64>,
        /// Epoch seconds (default: now)
        #[arg(short, long)]
        time: Option<i64>,
    },

    /// Show the newest reading
    Latest,

    /// List readings, newest first
    History {
        /// Number of readings
        #[arg(short, long, default_value = "20")]
        last: usize,
        /// Only readings at or before this epoch second
        #[arg(long)]
        end_at: Option<i64>,
    },

    /// Show the chart range, or set it when a value is given
    Range {
        value: Option<u32>,
    },

    /// Delete every reading of the token's user
    DeleteAll {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show server status
    Status,

    /// Mint a token with the server's secret (development)
    Token {
        /// User id
        uid: String,
        #[arg(long)]
        email: Option<String>,
        /// Secret (default: from config / MK2_JWT_SECRET)
        #[arg(long)]
        secret: Option<String>,
        /// Lifetime in hours (default: from config)
        #[arg(long)]
        ttl_hours: Option<u64>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .context("No token given; pass --token or set MK2_TOKEN")?;
        Ok(request.bearer_auth(token))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self
            .authed(request)?
            .send()
            .await
            .with_context(|| format!("Cannot connect to MK2 monitor at {}", self.base))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("Request failed ({}): {}", status, text);
        }
        Ok(response)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = ApiClient {
        http: reqwest::Client::new(),
        base: cli.api_url.clone(),
        token: cli.token.clone(),
    };
    let json = cli.format == "json";

    match cli.command {
        Commands::Push {
            power,
            diverted,
            load,
            time,
        } => {
            let body = serde_json::json!({
                "timestamp": time,
                "power": power,
                "diverted": diverted,
                "load": load,
            });

            let response = client
                .send(client.http.post(client.url("/api/v1/readings")).json(&body))
                .await?;
            let reading: Reading = response.json().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&reading)?);
            } else {
                println!("Pushed reading at {}", TableRow::from_reading(&reading).date_time);
            }
        }

        Commands::Latest => {
            let response = client
                .send(client.http.get(client.url("/api/v1/readings/latest")))
                .await?;
            let reading: Reading = response.json().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&reading)?);
            } else {
                print_table(&[reading]);
            }
        }

        Commands::History { last, end_at } => {
            let mut query = vec![("last", last.to_string())];
            if let Some(end_at) = end_at {
                query.push(("end_at", end_at.to_string()));
            }

            let response = client
                .send(client.http.get(client.url("/api/v1/readings")).query(&query))
                .await?;
            let data: serde_json::Value = response.json().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                let mut readings: Vec<Reading> =
                    serde_json::from_value(data["readings"].clone()).unwrap_or_default();
                readings.reverse();
                print_table(&readings);
            }
        }

        Commands::Range { value } => {
            let request = match value {
                Some(range) => client
                    .http
                    .put(client.url("/api/v1/range"))
                    .json(&serde_json::json!({ "range": range })),
                None => client.http.get(client.url("/api/v1/range")),
            };
            let data: serde_json::Value = client.send(request).await?.json().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                match data["range"].as_u64() {
                    Some(range) => println!("Chart range: {}", range),
                    None => println!(
                        "Chart range: not set (using {})",
                        data["effective"].as_u64().unwrap_or_default()
                    ),
                }
            }
        }

        Commands::DeleteAll { yes } => {
            if !yes {
                bail!("This deletes every stored reading; re-run with --yes to confirm");
            }
            client
                .send(client.http.delete(client.url("/api/v1/readings")))
                .await?;
            println!("All readings deleted");
        }

        Commands::Status => {
            let response = client
                .http
                .get(client.url("/health"))
                .send()
                .await
                .with_context(|| format!("Cannot connect to MK2 monitor at {}", client.base))?;
            if !response.status().is_success() {
                bail!("Server returned error: {}", response.status());
            }
            let health: serde_json::Value = response.json().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!(
                    "MK2 monitor v{}",
                    health["version"].as_str().unwrap_or("unknown")
                );
                println!();
                println!("Status:      {}", health["status"].as_str().unwrap_or("unknown"));
                println!("Storage:     {}", health["storage"].as_str().unwrap_or("unknown"));
                println!("Readings:    {}", health["readings"].as_u64().unwrap_or(0));
                println!("Dashboards:  {}", health["connections"].as_u64().unwrap_or(0));
                if let Some(uptime) = health["uptime_seconds"].as_u64() {
                    println!("Uptime:      {}", format_duration(uptime));
                }
            }
        }

        Commands::Token {
            uid,
            email,
            secret,
            ttl_hours,
        } => {
            let config = Config::load_default();
            let secret = secret.unwrap_or(config.auth.jwt_secret);
            let ttl = ttl_hours.unwrap_or(config.auth.token_ttl_hours);

            let token = TokenVerifier::new(secret).issue(&uid, email.as_deref(), ttl)?;
            println!("{}", token);
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

fn print_table(readings: &[Reading]) {
    if readings.is_empty() {
        println!("No readings");
        return;
    }

    println!(
        "{:<20} | {:<10} | {:<10} | {:<10}",
        "Date", "Power", "Diverted", "Load"
    );
    println!("{}", "-".repeat(59));

    for reading in readings {
        let row = TableRow::from_reading(reading);
        println!(
            "{:<20} | {:<10} | {:<10} | {:<10}",
            row.date_time, row.power, row.diverted, row.load
        );
    }
}
