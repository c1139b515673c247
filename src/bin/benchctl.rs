#![deny(clippy::unwrap_used)]

use clap::{arg, command, value_parser, ArgAction};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use benchctl::dmm::{Function, Multimeter};
use benchctl::export::{self, ExportError};
use benchctl::proto::ProtoError;
use benchctl::psu::PowerSupply;
use benchctl::scope::{
    Channel, DataEncoding, Oscilloscope, Slope, TransferFormat, TriggerConfig, TriggerMode,
    TriggerSource,
};
use benchctl::transport::LinkConfig;
use benchctl::{DEFAULT_BAUDRATE, DEFAULT_TTY};

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

#[tokio::main]
async fn main() {
    let matches =
        command!() // requires `cargo` feature
            .arg(
                arg!(
                    -p --device <PORT> "Serial port of the instrument"
                )
                .default_value(DEFAULT_TTY)
                .required(false)
                .value_parser(value_parser!(PathBuf)),
            )
            .arg(arg!(
                -d --debug ... "Turn debugging information on"
            ))
            .arg(
                arg!(
                    -b --baudrate <BAUDRATE> "Baudrate"
                )
                .default_value(DEFAULT_BAUDRATE.to_string())
                .value_parser(value_parser!(u32)),
            )
            .arg(
                arg!(
                    -t --timeout <MS> "Response timeout in milliseconds"
                )
                .default_value("1000")
                .value_parser(value_parser!(u64)),
            )
            .subcommand(clap::Command::new("ident").about("Oscilloscope identification"))
            .subcommand(
                clap::Command::new("capture")
                    .about("Arm the oscilloscope, wait for the trigger and save one channel")
                    .arg(
                        arg!(-c --channel <CH> "Channel to read")
                            .default_value("1")
                            .value_parser(value_parser!(Channel)),
                    )
                    .arg(
                        arg!(--source <SOURCE> "Trigger source (CH1..CH4, EXT, LINE), defaults to the channel")
                            .value_parser(value_parser!(TriggerSource)),
                    )
                    .arg(
                        arg!(--mode <MODE> "Trigger mode")
                            .default_value("single")
                            .value_parser(value_parser!(TriggerMode)),
                    )
                    .arg(
                        arg!(--level <VOLTS> "Trigger level")
                            .default_value("0")
                            .allow_negative_numbers(true)
                            .value_parser(value_parser!(f64)),
                    )
                    .arg(
                        arg!(--slope <SLOPE> "Trigger slope")
                            .default_value("rising")
                            .value_parser(value_parser!(Slope)),
                    )
                    .arg(
                        arg!(-w --wait <SECS> "Give up if the trigger does not fire in time")
                            .default_value("10")
                            .value_parser(value_parser!(u64)),
                    )
                    .arg(
                        arg!(--poll <MS> "Trigger status poll interval")
                            .default_value("100")
                            .value_parser(value_parser!(u64)),
                    )
                    .arg(arg!(--start <POS> "First record position").value_parser(value_parser!(u32)))
                    .arg(arg!(--stop <POS> "Last record position").value_parser(value_parser!(u32)))
                    .arg(
                        arg!(--t0 <SECS> "Start of the time window, instead of --start/--stop")
                            .allow_negative_numbers(true)
                            .requires("duration")
                            .conflicts_with_all(["start", "stop"])
                            .value_parser(value_parser!(f64)),
                    )
                    .arg(
                        arg!(--duration <SECS> "Length of the time window")
                            .requires("t0")
                            .value_parser(value_parser!(f64)),
                    )
                    .arg(arg!(--ascii "Transfer samples as ASCII instead of binary"))
                    .arg(
                        arg!(-o --output <FILE> "CSV file, named after channel and capture time if omitted")
                            .value_parser(value_parser!(PathBuf)),
                    ),
            )
            .subcommand(
                clap::Command::new("psu")
                    .about("Power supply")
                    .arg(
                        arg!(--voltage <VOLTS> "Set output voltage")
                            .value_parser(value_parser!(f64)),
                    )
                    .arg(
                        arg!(--current <AMPS> "Set current limit")
                            .value_parser(value_parser!(f64)),
                    )
                    .arg(arg!(--on "Enable output").conflicts_with("off"))
                    .arg(arg!(--off "Disable output")),
            )
            .subcommand(
                clap::Command::new("dmm")
                    .about("Multimeter reading")
                    .arg(
                        arg!([function] "Select function first (vdc, vac, mvdc, mvac, adc, aac, madc, maac, ohm, hz)")
                            .value_parser(value_parser!(Function)),
                    )
                    .arg(arg!(--local "Return the meter to front panel control afterwards").action(ArgAction::SetTrue)),
            )
            .subcommand_required(true)
            .get_matches();

    let level = match matches.get_count("debug") {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let port = matches
        .get_one::<PathBuf>("device")
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| DEFAULT_TTY.to_string());

    match handle_args(&matches).await {
        Ok(()) => {}
        Err(CliError::Proto(e)) => {
            match e {
                ProtoError::Connection { source, .. } => {
                    if source.kind() == tokio_serial::ErrorKind::NoDevice
                        || matches!(
                            source.kind(),
                            tokio_serial::ErrorKind::Io(ErrorKind::NotFound)
                        )
                    {
                        eprintln!("{}: File not found", port);
                    } else {
                        eprintln!("Unable to open: {} [device: {}]", source, port);
                    }
                }
                ProtoError::Io(err) => {
                    eprintln!("I/O Error: {} [device: {}]", err, port);
                }
                ProtoError::Serial(err) => {
                    eprintln!("I/O Error: {} [device: {}]", err, port);
                }
                ProtoError::Timeout(after) => {
                    eprintln!("No response within {:?}, is the instrument on?", after);
                }
                ProtoError::Cancelled => {
                    eprintln!("Cancelled, the oscilloscope is still armed");
                }
                ProtoError::Abort => {
                    eprintln!("Failed to communicate with device, aborting!");
                }
                ProtoError::Unexpected(response) => {
                    eprintln!(
                        "Received an unexpected response from device, aborting!: {:?}",
                        response
                    );
                }
                other => eprintln!("{}", other),
            }
            exit(-1);
        }
        Err(CliError::Export(e)) => {
            eprintln!("Unable to save waveform: {}", e);
            exit(-1);
        }
    }
}

async fn handle_args(matches: &clap::ArgMatches) -> Result<(), CliError> {
    let port = matches
        .get_one::<PathBuf>("device")
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| DEFAULT_TTY.to_string());
    let baud_rate = matches
        .get_one::<u32>("baudrate")
        .unwrap_or(&DEFAULT_BAUDRATE);
    let timeout = matches.get_one::<u64>("timeout").unwrap_or(&1000);
    let config = LinkConfig::new(port)
        .baudrate(*baud_rate)
        .timeout(Duration::from_millis(*timeout));

    match matches.subcommand() {
        // Oscilloscope ID
        Some(("ident", _args)) => {
            let mut scope = Oscilloscope::connect(&config).await?;
            let ident = scope.ident().await?;
            println!("Manufacturer: {}", ident.manufacturer);
            println!("Model: {}", ident.model);
            println!("Serial: {}", ident.serial);
            println!("Firmware: {}", ident.firmware);
        }
        // Triggered capture
        Some(("capture", args)) => {
            let channel = *args.get_one::<Channel>("channel").unwrap_or(&Channel::Ch1);
            let source = args
                .get_one::<TriggerSource>("source")
                .copied()
                .unwrap_or(TriggerSource::Channel(channel));
            let trigger = TriggerConfig::new(
                *args.get_one::<TriggerMode>("mode").unwrap_or(&TriggerMode::Single),
                source,
                *args.get_one::<f64>("level").unwrap_or(&0.0),
                *args.get_one::<Slope>("slope").unwrap_or(&Slope::Rising),
            );
            let wait = Duration::from_secs(*args.get_one::<u64>("wait").unwrap_or(&10));
            let poll = Duration::from_millis(*args.get_one::<u64>("poll").unwrap_or(&100));

            let mut scope = Oscilloscope::connect(&config).await?;
            eprintln!("Connected to: {}\n", scope.link().port());
            if args.get_flag("ascii") {
                scope.set_transfer_format(TransferFormat {
                    encoding: DataEncoding::Ascii,
                    ..TransferFormat::default()
                })?;
            }

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let mut acquisition = scope.acquisition();
            acquisition.arm(trigger).await?;
            eprintln!("Armed, waiting for trigger (Ctrl-C to cancel)");
            acquisition.wait_for_trigger(poll, wait, &cancel).await?;

            let window = (args.get_one::<u32>("start"), args.get_one::<u32>("stop"));
            let waveform = match (args.get_one::<f64>("t0"), window) {
                (Some(t0), _) => {
                    let duration = *args.get_one::<f64>("duration").unwrap_or(&0.0);
                    acquisition
                        .read_waveform_between(channel, *t0, duration)
                        .await?
                }
                (None, (None, None)) => acquisition.read_waveform(channel).await?,
                (None, (start, stop)) => {
                    let range = *start.unwrap_or(&1)..=*stop.unwrap_or(&u32::MAX);
                    acquisition.read_waveform_range(channel, range).await?
                }
            };

            let path = args
                .get_one::<PathBuf>("output")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(export::default_file_name(&waveform)));
            export::save_csv(&waveform, &path)?;
            println!("{} samples -> {}", waveform.len(), path.display());
        }
        // Power supply
        Some(("psu", args)) => {
            let mut psu = PowerSupply::connect(&config)?;
            if let Some(volts) = args.get_one::<f64>("voltage") {
                psu.set_voltage(*volts).await?;
            }
            if let Some(amps) = args.get_one::<f64>("current") {
                psu.set_current_limit(*amps).await?;
            }
            if args.get_flag("on") {
                psu.run().await?;
            } else if args.get_flag("off") {
                psu.stop().await?;
            }
            println!("Output: {} V", psu.read_output().await?);
            println!("Current: {} A", psu.read_current().await?);
        }
        // Multimeter
        Some(("dmm", args)) => {
            let mut dmm = Multimeter::connect(&config)?;
            dmm.remote().await?;
            let value = match args.get_one::<Function>("function") {
                Some(function) => dmm.measure(*function).await?,
                None => dmm.read_value().await?,
            };
            let readout = dmm.display().await?;
            println!("{} ({})", value, readout);
            if args.get_flag("local") {
                dmm.local().await?;
            }
        }
        _ => unreachable!("subcommand is required"),
    }
    Ok(())
}
