// Copyright 2025-2026 CEMAXECUTER LLC

mod cancel;
mod capture;
mod dispatch;
// The device controller is only driven by the binary with a radio backend
#[cfg_attr(not(feature = "ubertooth"), allow(dead_code))]
mod mode;
#[cfg_attr(not(feature = "ubertooth"), allow(dead_code))]
mod session;

#[cfg(test)]
mod testutil;

use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::time::Duration;

use bt_output::{SinkFormat, SinkSpec};
use bt_protocol::address::{parse_access_address, parse_mac};
use bt_protocol::{AdvertisingChannel, CrcErrorBudget, ValidationError};
use bt_radio::file::DumpFileSource;

use cancel::{install_signal_handler, CancellationToken};
use mode::{CrcPolicy, Plan, RequestedMode, SessionConfig, Source};
use session::{open_sinks, replay, SessionError};

#[derive(Parser, Debug)]
#[command(name = "ubertooth-btle")]
#[command(version, about = "Passive Bluetooth Low Energy monitoring")]
#[command(after_help = "If an input file is not specified, an Ubertooth device is used for live capture.\n\
                        In get/set mode no capture occurs.")]
struct Cli {
    /// Follow connections
    #[arg(short = 'f', long)]
    follow: bool,

    /// Promiscuous: sniff active connections
    #[arg(short = 'p', long)]
    promiscuous: bool,

    /// Get access address, or set it when one is given (example: -a 8e89bed6)
    #[arg(short = 'a', long = "access-address", value_name = "AA", num_args = 0..=1)]
    access_address: Option<Option<String>>,

    /// Faux slave mode, using MAC address (example: -s 22:44:66:88:aa:cc)
    #[arg(short = 's', long = "slave", value_name = "MAC")]
    slave: Option<String>,

    /// Set connection following target (example: -t 22:44:66:88:aa:cc)
    #[arg(short = 't', long, value_name = "MAC")]
    target: Option<String>,

    /// Transmit an advertisement from MAC address
    #[arg(short = 'b', long, value_name = "MAC")]
    transmit: Option<String>,

    /// Read packets from a binary dump file instead of a device
    #[arg(short = 'i', long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Ubertooth device to use (-1 = first found)
    #[arg(short = 'U', long, default_value_t = -1, allow_negative_numbers = true)]
    device: i32,

    /// Capture packets to PCAPNG file
    #[arg(short = 'r', long, value_name = "FILE")]
    pcapng: Vec<PathBuf>,

    /// Capture packets to PCAP file (DLT_BLUETOOTH_LE_LL_WITH_PHDR)
    #[arg(short = 'q', long, value_name = "FILE")]
    pcap: Vec<PathBuf>,

    /// Capture packets to PCAP file (DLT_PPI)
    #[arg(short = 'c', long, value_name = "FILE")]
    ppi: Vec<PathBuf>,

    /// Dump packets to binary file
    #[arg(short = 'd', long, value_name = "FILE")]
    dump: Vec<PathBuf>,

    /// Advertising channel index
    #[arg(short = 'A', long = "adv-index", default_value_t = 37)]
    adv_index: u32,

    /// Verify CRC mode: get status, or disable (0) / enable (1)
    #[arg(
        short = 'v',
        long = "crc-verify",
        value_name = "0|1",
        num_args = 0..=1,
        value_parser = clap::value_parser!(u8).range(0..=1)
    )]
    crc_verify: Option<Option<u8>>,

    /// Allow n access address offenses
    #[arg(short = 'x', long = "aa-errors", default_value_t = CrcErrorBudget::MAX)]
    aa_errors: u32,

    /// Access address data channel frames must match
    #[arg(long, value_name = "AA")]
    expect_aa: Option<String>,

    /// Microseconds to sleep between device polls
    #[arg(long, default_value_t = 10)]
    poll_interval_us: u64,

    /// Print capture statistics
    #[arg(long)]
    stats: bool,

    /// Debug logging
    #[arg(long)]
    verbose: bool,
}

/// Validate every argument and build the ordered mode list.
/// Nothing here touches the device or the filesystem.
fn build_plan(cli: &Cli) -> Result<Plan, ValidationError> {
    let channel = AdvertisingChannel::try_from(cli.adv_index)?;
    let budget = CrcErrorBudget::new(cli.aa_errors)?;

    let set_aa = match &cli.access_address {
        Some(Some(text)) => Some(parse_access_address(text)?),
        _ => None,
    };
    let expected_aa = match &cli.expect_aa {
        Some(text) => Some(parse_access_address(text)?),
        None => set_aa,
    };
    let crc_policy = match cli.crc_verify {
        Some(Some(0)) => CrcPolicy::Disable,
        Some(Some(_)) => CrcPolicy::Enable,
        Some(None) | None => CrcPolicy::Query,
    };
    let slave = cli.slave.as_deref().map(parse_mac).transpose()?;
    let target = cli.target.as_deref().map(parse_mac).transpose()?;
    let transmit = cli.transmit.as_deref().map(parse_mac).transpose()?;

    let mut sinks = Vec::new();
    let files = [
        (SinkFormat::PcapNg, &cli.pcapng),
        (SinkFormat::PcapLe, &cli.pcap),
        (SinkFormat::PcapPpi, &cli.ppi),
        (SinkFormat::Dump, &cli.dump),
    ];
    for (format, paths) in files {
        sinks.extend(paths.iter().map(|p| SinkSpec::new(format, p.clone())));
    }

    let config = SessionConfig {
        budget,
        expected_aa,
        crc_policy,
        poll_interval: Duration::from_micros(cli.poll_interval_us),
        stats: cli.stats,
        sinks,
    };

    if let Some(path) = &cli.input {
        let device_modes = cli.follow
            || cli.promiscuous
            || cli.access_address.is_some()
            || slave.is_some()
            || target.is_some()
            || transmit.is_some();
        if device_modes {
            log::warn!("reading from {}, device modes ignored", path.display());
        }
        return Ok(Plan {
            source: Source::File(path.clone()),
            config,
            modes: Vec::new(),
        });
    }

    let mut modes = Vec::new();
    if cli.follow {
        if cli.promiscuous {
            log::warn!("both -f and -p given, following connections");
        }
        modes.push(RequestedMode::Follow { channel });
    } else if cli.promiscuous {
        modes.push(RequestedMode::Promiscuous);
    }
    let streaming = !modes.is_empty();

    if let Some(None) = cli.access_address {
        modes.push(RequestedMode::GetAccessAddress);
    }
    if let Some(aa) = set_aa {
        modes.push(RequestedMode::SetAccessAddress(aa));
    }
    if cli.crc_verify.is_some() && !streaming {
        modes.push(RequestedMode::CrcVerify(crc_policy));
    }
    if let Some(address) = slave {
        modes.push(RequestedMode::FauxSlave { channel, address });
    }
    if let Some(mac) = target {
        modes.push(RequestedMode::SetTarget(mac));
    }
    if let Some(address) = transmit {
        modes.push(RequestedMode::Transmit { channel, address });
    }

    Ok(Plan {
        source: Source::Device(cli.device),
        config,
        modes,
    })
}

#[cfg(feature = "ubertooth")]
fn run_device(index: i32, plan: Plan, sinks: bt_output::SinkRegistry, cancel: CancellationToken) -> Result<(), SessionError> {
    use bt_radio::ubertooth::UbertoothDevice;
    use session::Controller;

    let radio = UbertoothDevice::open(index)?;
    let mut controller = Controller::new(radio, plan.config, sinks, cancel);
    let result = controller.run_plan(&plan.modes, |outcome| println!("{}", outcome));
    controller.finish();
    result
}

#[cfg(not(feature = "ubertooth"))]
fn run_device(index: i32, _plan: Plan, _sinks: bt_output::SinkRegistry, _cancel: CancellationToken) -> Result<(), SessionError> {
    log::debug!("device {} requested without a radio backend", index);
    Err(bt_radio::TransportError::NoBackend.into())
}

fn run(plan: Plan) -> Result<(), SessionError> {
    let cancel = CancellationToken::new();
    if let Err(e) = install_signal_handler(&cancel) {
        log::warn!("could not install interrupt handler: {}", e);
    }

    let sinks = open_sinks(&plan.config.sinks)?;
    match plan.source.clone() {
        Source::File(path) => {
            let mut reader = DumpFileSource::open(&path)?;
            let outcome = replay(&mut reader, &plan.config, sinks, &cancel)?;
            println!("{}", outcome);
            Ok(())
        }
        Source::Device(index) => run_device(index, plan, sinks, cancel),
    }
}

/// One line for the operator when the program gives up
fn error_line(e: &dyn std::fmt::Display) -> String {
    format!("error: {}", e)
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let plan = match build_plan(&cli) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{}", error_line(&e));
            std::process::exit(1);
        }
    };

    if plan.modes.is_empty() && matches!(plan.source, Source::Device(_)) {
        eprintln!("no mode requested");
        let _ = Cli::command().print_help();
        std::process::exit(1);
    }

    if let Err(e) = run(plan) {
        eprintln!("{}", error_line(&e));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_protocol::{AccessAddress, LinkLayerAddress};

    fn plan(args: &[&str]) -> Result<Plan, ValidationError> {
        let mut argv = vec!["ubertooth-btle"];
        argv.extend_from_slice(args);
        build_plan(&Cli::try_parse_from(argv).unwrap())
    }

    const MAC: LinkLayerAddress = LinkLayerAddress::new([0x22, 0x44, 0x66, 0x88, 0xAA, 0xCC]);

    #[test]
    fn test_follow_defaults() {
        let p = plan(&["-f"]).unwrap();
        assert_eq!(p.source, Source::Device(-1));
        assert_eq!(p.modes, vec![RequestedMode::Follow { channel: AdvertisingChannel::Ch37 }]);
        assert_eq!(p.config.budget, CrcErrorBudget::default());
        assert_eq!(p.config.crc_policy, CrcPolicy::Query);
        assert_eq!(p.config.poll_interval, Duration::from_micros(10));
    }

    #[test]
    fn test_follow_wins_over_promiscuous() {
        let p = plan(&["-p", "-f", "-A", "39"]).unwrap();
        assert_eq!(p.modes, vec![RequestedMode::Follow { channel: AdvertisingChannel::Ch39 }]);
    }

    #[test]
    fn test_get_and_set_access_address() {
        let p = plan(&["-a"]).unwrap();
        assert_eq!(p.modes, vec![RequestedMode::GetAccessAddress]);

        let p = plan(&["-a", "af9a8736"]).unwrap();
        assert_eq!(p.modes, vec![RequestedMode::SetAccessAddress(AccessAddress(0xAF9A8736))]);
        assert_eq!(p.config.expected_aa, Some(AccessAddress(0xAF9A8736)));

        assert_eq!(
            plan(&["-a", "xyz"]).unwrap_err(),
            ValidationError::InvalidAccessAddress("xyz".into())
        );
    }

    #[test]
    fn test_crc_policy_flag() {
        assert_eq!(plan(&["-v"]).unwrap().modes, vec![RequestedMode::CrcVerify(CrcPolicy::Query)]);
        assert_eq!(plan(&["-v", "0"]).unwrap().modes, vec![RequestedMode::CrcVerify(CrcPolicy::Disable)]);

        // With a capture the policy configures the capture instead
        let p = plan(&["-p", "-v", "1"]).unwrap();
        assert_eq!(p.modes, vec![RequestedMode::Promiscuous]);
        assert_eq!(p.config.crc_policy, CrcPolicy::Enable);

        assert!(Cli::try_parse_from(["ubertooth-btle", "-v", "2"]).is_err());
    }

    #[test]
    fn test_invalid_arguments_rejected() {
        assert_eq!(plan(&["-f", "-A", "36"]).unwrap_err(), ValidationError::InvalidChannelIndex(36));
        assert_eq!(plan(&["-f", "-A", "40"]).unwrap_err(), ValidationError::InvalidChannelIndex(40));
        assert_eq!(plan(&["-f", "-x", "33"]).unwrap_err(), ValidationError::BudgetOutOfRange(33));
        assert_eq!(plan(&["-t", "22:44:66:88:aa"]).unwrap_err(), ValidationError::InvalidLength(14));
        assert!(matches!(
            plan(&["-s", "22:44:66:88:aa:cg"]).unwrap_err(),
            ValidationError::InvalidCharacter(_)
        ));
    }

    #[test]
    fn test_error_line_prefix() {
        let invalid = plan(&["-f", "-A", "36"]).unwrap_err();
        assert_eq!(error_line(&invalid), "error: advertising index must be 37, 38, or 39 (got 36)");
        let transport = SessionError::from(bt_radio::TransportError::NoBackend);
        assert!(error_line(&transport).starts_with("error: "));
    }

    #[test]
    fn test_mode_order_and_mac_modes() {
        let p = plan(&["-b", "22:44:66:88:aa:cc", "-t", "22:44:66:88:aa:cc", "-s", "22:44:66:88:aa:cc", "-A", "38"]).unwrap();
        let channel = AdvertisingChannel::Ch38;
        assert_eq!(
            p.modes,
            vec![
                RequestedMode::FauxSlave { channel, address: MAC },
                RequestedMode::SetTarget(MAC),
                RequestedMode::Transmit { channel, address: MAC },
            ]
        );
    }

    #[test]
    fn test_replay_plan_and_sinks() {
        let p = plan(&["-i", "in.bin", "-q", "a.pcap", "-c", "b.pcap", "-r", "c.pcapng", "-x", "4"]).unwrap();
        assert_eq!(p.source, Source::File(PathBuf::from("in.bin")));
        assert!(p.modes.is_empty());
        assert_eq!(p.config.budget.get(), 4);
        assert_eq!(
            p.config.sinks,
            vec![
                SinkSpec::new(SinkFormat::PcapNg, "c.pcapng"),
                SinkSpec::new(SinkFormat::PcapLe, "a.pcap"),
                SinkSpec::new(SinkFormat::PcapPpi, "b.pcap"),
            ]
        );
    }

    #[test]
    fn test_device_index() {
        assert_eq!(plan(&["-p", "-U", "3"]).unwrap().source, Source::Device(3));
    }
}
