use anyhow::Context;
use clap::{Parser, Subcommand};
use cityweather_core::{CityRecord, Config, SyncEngine, SyncReport};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cityweather", version, about = "Track weather for a list of cities")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key.
    Configure,

    /// Start tracking a city and fetch its weather.
    Add {
        /// City name as understood by the provider, e.g. "London".
        name: String,
    },

    /// Stop tracking a city.
    Remove {
        name: String,
    },

    /// List tracked cities with their last known weather.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show one city.
    Show {
        name: String,

        #[arg(long)]
        json: bool,
    },

    /// Fetch fresh weather for every tracked city.
    Refresh,
}

impl Command {
    /// City argument with surrounding whitespace removed, for commands that take one.
    pub fn city_name(&self) -> Option<&str> {
        match self {
            Command::Add { name } | Command::Remove { name } | Command::Show { name, .. } => {
                Some(name.trim())
            }
            _ => None,
        }
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let name = self.command.city_name().unwrap_or_default().to_string();

        match self.command {
            Command::Configure => configure()?,
            Command::Add { .. } => {
                let engine = open_engine()?;
                let outcome = engine.add_city(&name).await?;
                match &outcome.fetch_error {
                    None => println!("Added {}", describe(&outcome.record)),
                    Some(err) => {
                        println!("Added {} (forecast unavailable: {err})", outcome.record.name)
                    }
                }
                print_cities(&engine.list_cities()?);
            }
            Command::Remove { .. } => {
                let engine = open_engine()?;
                let city = engine.get_by_name(&name)?;
                engine.remove_city(city.id)?;
                println!("Removed {}", city.name);
                print_cities(&engine.list_cities()?);
            }
            Command::List { json } => {
                let engine = open_engine()?;
                let cities = engine.list_cities()?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&cities)?);
                } else {
                    print_cities(&cities);
                }
            }
            Command::Show { json, .. } => {
                let engine = open_engine()?;
                let city = engine.get_by_name(&name)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&city)?);
                } else {
                    println!("{}", describe(&city));
                    if let Some(url) = city.icon_url() {
                        println!("  icon: {url}");
                    }
                }
            }
            Command::Refresh => {
                let engine = open_engine()?;
                let report = engine.refresh_all().await?;
                print_report(&report);
                print_cities(&engine.list_cities()?);
            }
        }

        Ok(())
    }
}

fn open_engine() -> anyhow::Result<SyncEngine> {
    let config = Config::load()?;
    SyncEngine::from_config(&config)
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = inquire::Password::new("OpenWeather API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    config.set_api_key(api_key.trim().to_string());
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn describe(city: &CityRecord) -> String {
    if !city.has_weather() {
        return format!("{}: no data yet", city.name);
    }

    let temperature = city
        .temperature
        .map(|t| format!("{t:.1}°C"))
        .unwrap_or_else(|| "?°C".to_string());
    let condition = city.condition.as_deref().unwrap_or("unknown");

    format!("{}: {temperature}, {condition}", city.name)
}

fn print_cities(cities: &[CityRecord]) {
    if cities.is_empty() {
        println!("No cities tracked. Add one with `cityweather add <name>`.");
        return;
    }

    for city in cities {
        println!("  [{}] {}", city.id, describe(city));
    }
}

fn print_report(report: &SyncReport) {
    println!("Refreshed {} of {} cities", report.succeeded.len(), report.len());
    for (name, err) in &report.failed {
        println!("  {name}: forecast unavailable ({err})");
    }
}
