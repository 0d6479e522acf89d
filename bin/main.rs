use tracing::info;
use tracing_subscriber;

use clap::{value_t, values_t, App, Arg, ArgMatches, SubCommand};

use rendezvous::manager::ConnectionManager;
use rendezvous::settings::Settings;
use rendezvous::transport::TcpTransport;
use rendezvous::{Rank, Result};

use std::path::{Path, PathBuf};

fn group_args<'a, 'b>(command: App<'a, 'b>) -> App<'a, 'b> {
    command
        .arg(
            Arg::with_name("acceptor")
                .short("a")
                .long("acceptor")
                .value_name("ACCEPTOR_GROUP")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("requester")
                .short("r")
                .long("requester")
                .value_name("REQUESTER_GROUP")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("rank")
                .short("n")
                .long("rank")
                .value_name("RANK")
                .takes_value(true)
                .required(true),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = App::new("rendezvous")
        .version("0.1")
        .about("Connects an acceptor group and a requester group through a shared directory")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("CONFIG_FILE")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("directory")
                .short("d")
                .long("directory")
                .value_name("ADDRESS_DIRECTORY")
                .takes_value(true),
        )
        .subcommand(
            group_args(SubCommand::with_name("accept").about("Opens an endpoint and waits for the requester group"))
                .arg(
                    Arg::with_name("known-size")
                        .short("k")
                        .long("known-size")
                        .value_name("REQUESTER_GROUP_SIZE")
                        .help("Accept exactly this many requesters on an endpoint of this rank")
                        .takes_value(true),
                ),
        )
        .subcommand(
            group_args(SubCommand::with_name("request").about("Connects to the acceptor group"))
                .arg(
                    Arg::with_name("size")
                        .short("s")
                        .long("size")
                        .value_name("REQUESTER_GROUP_SIZE")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("targets")
                        .short("t")
                        .long("targets")
                        .value_name("ACCEPTOR_RANKS")
                        .help("Connect to the endpoint of every listed acceptor rank")
                        .multiple(true)
                        .use_delimiter(true),
                ),
        )
        .get_matches();

    let config_file = matches.value_of("config").map(PathBuf::from);
    let mut settings = Settings::new(config_file.as_deref())?;
    if let Some(directory) = matches.value_of("directory") {
        settings.address_directory = Path::new(directory).to_path_buf();
    }

    tracing_subscriber::fmt()
        .with_level(false)
        .with_target(false)
        .without_time()
        .compact()
        .with_max_level(settings.log_level())
        .init();

    let transport = TcpTransport::from_settings(&settings)?;
    let mut manager = ConnectionManager::from_settings(transport, &settings);

    let own_rank = match matches.subcommand() {
        ("accept", Some(sub)) => {
            let (acceptor, requester, rank) = group(sub);
            if sub.is_present("known-size") {
                let size = value_t!(sub, "known-size", i32).unwrap_or_else(|e| e.exit());
                manager.accept_known_group(&acceptor, &requester, rank, size).await?;
            } else {
                manager.accept_unbounded(&acceptor, &requester, rank).await?;
            }
            rank
        }
        ("request", Some(sub)) => {
            let (acceptor, requester, rank) = group(sub);
            if sub.is_present("targets") {
                let targets = values_t!(sub, "targets", Rank).unwrap_or_else(|e| e.exit());
                manager.connect_fanout(&acceptor, &requester, targets, rank).await?;
            } else {
                let size = value_t!(sub, "size", i32).unwrap_or_else(|e| e.exit());
                manager.connect_single(&acceptor, &requester, rank, size).await?;
            }
            rank
        }
        _ => {
            eprintln!("{}", matches.usage());
            std::process::exit(2);
        }
    };

    info!("connected to {} ranks: {:?}", manager.remote_group_size()?, manager.ranks());

    // every side announces its own rank over every channel
    for rank in manager.ranks() {
        manager.channel_for(rank)?.send_int(own_rank).await?;
    }
    for rank in manager.ranks() {
        let value = manager.channel_for(rank)?.recv_int().await?;
        info!("channel {} announced rank {}", rank, value);
    }

    manager.close().await
}

fn group(matches: &ArgMatches) -> (String, String, Rank) {
    let acceptor = value_t!(matches, "acceptor", String).unwrap_or_else(|e| e.exit());
    let requester = value_t!(matches, "requester", String).unwrap_or_else(|e| e.exit());
    let rank = value_t!(matches, "rank", Rank).unwrap_or_else(|e| e.exit());
    (acceptor, requester, rank)
}
