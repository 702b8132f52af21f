use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use resideo_t10::config::Config;
use resideo_t10::{
    spawn_maintenance, FanMode, HvacMode, PriorityType, ResideoClient, Thermostat,
};
use tracing_subscriber::EnvFilter;

/// Command-line control of Resideo T10 thermostats
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (TOML). RESIDEO_* environment variables override it.
    #[arg(long, short, env = "RESIDEO_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the URL to open in a browser to grant access
    AuthorizeUrl,
    /// Exchange an authorization code (or the full redirect URL) for tokens
    Exchange { code_or_callback: String },
    /// Refresh the stored access token now
    Refresh,
    /// Discover and list thermostats
    List,
    /// Show the current state of one thermostat
    Status { device_id: String },
    SetMode { device_id: String, mode: String },
    SetHeat { device_id: String, setpoint: f64 },
    SetCool { device_id: String, setpoint: f64 },
    Fan { device_id: String, mode: String },
    EmergencyHeat { device_id: String },
    /// Show or change the room priority
    Priority {
        device_id: String,
        #[arg(long, value_enum)]
        set: Option<PriorityArg>,
        /// Room ids for pick-a-room priority, comma separated
        #[arg(long, value_delimiter = ',')]
        rooms: Vec<u32>,
    },
    Rooms {
        device_id: String,
        #[arg(long, default_value_t = 0)]
        group: u32,
    },
    /// Poll and print change events until interrupted
    Monitor,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PriorityArg {
    PickARoom,
    WholeHouse,
    FollowMe,
}

impl From<PriorityArg> for PriorityType {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::PickARoom => PriorityType::PickARoom,
            PriorityArg::WholeHouse => PriorityType::WholeHouse,
            PriorityArg::FollowMe => PriorityType::FollowMe,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "resideo_t10=info",
        1 => "resideo_t10=debug",
        _ => "resideo_t10=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_thermostat(t: &Thermostat) {
    let mode = t.mode().map_or_else(|| "unknown".to_string(), |m| m.to_string());
    let indoor = t.indoor().map_or_else(|| "-".to_string(), |v| v.to_string());
    let heat = t.heat_setpoint().map_or_else(|| "-".to_string(), |v| v.to_string());
    let cool = t.cool_setpoint().map_or_else(|| "-".to_string(), |v| v.to_string());
    println!(
        "{} [{}] {} @ {} | indoor {} | mode {} | heat {} cool {}{}{}",
        t.display_name,
        t.device_id,
        t.device_model,
        t.location_name,
        indoor,
        mode,
        heat,
        cool,
        if t.is_permanent_hold() { " | hold" } else { "" },
        if t.is_alive { "" } else { " | OFFLINE" },
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::load(args.config.as_deref()).context("loading configuration")?;
    let mut builder = config
        .client_builder()
        .context("set client_id and client_secret in the config file or RESIDEO_* variables")?;
    if let Command::Monitor = args.command {
        builder = builder.on_event(|event| println!("{event:?}"));
    }

    let client = builder.build().context("building client")?;
    run(&client, &config, args.command).await
}

async fn run(client: &ResideoClient, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::AuthorizeUrl => println!("{}", client.authorization_url()?),
        Command::Exchange { code_or_callback } => {
            let message = client
                .complete_authorization(&code_or_callback)
                .await
                .context("completing authorization")?;
            println!("{message}");
        }
        Command::Refresh => {
            client.refresh_token().await.context("refreshing token")?;
            if let Some(at) = client.token_expires_at().await {
                println!("token valid until {at}");
            }
        }
        Command::List => {
            for t in client.discover().await.context("discovering thermostats")? {
                print_thermostat(&t);
            }
        }
        Command::Status { device_id } => {
            let t = client
                .thermostat_status(&device_id)
                .await
                .with_context(|| format!("reading {device_id}"))?;
            print_thermostat(&t);
        }
        Command::SetMode { device_id, mode } => {
            let mode = HvacMode::parse(&mode).ok_or_else(|| anyhow!("unknown mode {mode:?}"))?;
            client
                .set_mode(&device_id, mode)
                .await
                .with_context(|| format!("setting mode on {device_id}"))?;
            println!("mode set to {mode}");
        }
        Command::SetHeat { device_id, setpoint } => {
            client
                .set_heating_setpoint(&device_id, setpoint)
                .await
                .with_context(|| format!("setting heat setpoint on {device_id}"))?;
            println!("heat setpoint set to {setpoint}");
        }
        Command::SetCool { device_id, setpoint } => {
            client
                .set_cooling_setpoint(&device_id, setpoint)
                .await
                .with_context(|| format!("setting cool setpoint on {device_id}"))?;
            println!("cool setpoint set to {setpoint}");
        }
        Command::Fan { device_id, mode } => {
            let mode = FanMode::parse(&mode).ok_or_else(|| anyhow!("unknown fan mode {mode:?}"))?;
            client
                .set_fan_mode(&device_id, mode)
                .await
                .with_context(|| format!("setting fan on {device_id}"))?;
            println!("fan set to {}", mode.as_vendor_str());
        }
        Command::EmergencyHeat { device_id } => {
            client
                .emergency_heat(&device_id)
                .await
                .with_context(|| format!("enabling emergency heat on {device_id}"))?;
            println!("emergency heat on");
        }
        Command::Priority { device_id, set, rooms } => {
            let context = || format!("priority on {device_id}");
            match (set, rooms.is_empty()) {
                (None, true) => {
                    let p = client.priority(&device_id).await.with_context(context)?;
                    println!("{} rooms {:?}", p.priority_type.as_vendor_str(), p.selected_rooms);
                }
                (Some(PriorityArg::PickARoom), _) | (None, false) => {
                    client
                        .set_selected_rooms(&device_id, &rooms)
                        .await
                        .with_context(context)?;
                    println!("priority set to rooms {rooms:?}");
                }
                (Some(other), _) => {
                    let priority_type = PriorityType::from(other);
                    client
                        .set_priority(&device_id, priority_type)
                        .await
                        .with_context(context)?;
                    println!("priority set to {}", priority_type.as_vendor_str());
                }
            }
        }
        Command::Rooms { device_id, group } => {
            let rooms = client
                .rooms(&device_id, group)
                .await
                .with_context(|| format!("listing rooms of {device_id}"))?;
            for room in rooms {
                let temp = room.avg_temperature.map_or_else(|| "-".to_string(), |t| format!("{t:.1}"));
                println!("{:>3} {} ({temp})", room.id, room.name);
            }
        }
        Command::Monitor => monitor(client.clone(), config).await?,
    }
    Ok(())
}

async fn monitor(client: ResideoClient, config: &Config) -> Result<()> {
    for t in client.discover().await.context("initial discovery")? {
        print_thermostat(&t);
    }

    let maintenance = spawn_maintenance(client, config.poll_interval());
    println!("polling every {:?}, ctrl-c to stop", config.poll_interval());
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    maintenance.stop();
    Ok(())
}
