// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use bt_output::{SinkRegistry, SinkSpec};
use bt_protocol::ble::{adv_ind, hex_bytes, with_crc, ADV_CRC_SEED, DATA_CRC_SEED, TRANSMIT_ADV_DATA};
use bt_protocol::{AccessAddress, AdvertisingChannel, LinkLayerAddress, ValidationError};
use bt_radio::{CommandStatus, Modulation, PacketSource, Radio, TransportError, FOLLOW_SNIFF_PARAM};

use crate::cancel::CancellationToken;
use crate::capture::{run_capture, CaptureEnd, CaptureOptions};
use crate::dispatch::{CaptureStats, Dispatcher};
use crate::mode::{CrcPolicy, RequestedMode, SessionConfig};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("could not open capture file {path}: {source}")]
    Sink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Controller lifecycle. Streaming modes go
/// Idle -> Configuring -> Capturing -> Draining -> Idle,
/// one-shot modes go Idle -> Querying -> Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Configuring,
    Capturing,
    Draining,
    Querying,
}

/// Everything transmit mode reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitReport {
    pub address: LinkLayerAddress,
    pub channel_status: CommandStatus,
    /// Read back from the device when the channel was accepted
    pub current_channel: Option<u16>,
    pub access_address: AccessAddress,
    /// Diagnostic ADV_IND with the advertising-seed CRC
    pub adv_ind_adv_crc: Vec<u8>,
    /// Same PDU with the default data-seed CRC
    pub adv_ind_data_crc: Vec<u8>,
    pub tx_status: CommandStatus,
}

/// Result of one requested mode, printed for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Capture { end: CaptureEnd, stats: CaptureStats },
    AccessAddress(AccessAddress),
    AccessAddressSet(AccessAddress),
    CrcVerify(bool),
    TargetSet(LinkLayerAddress),
    TargetRejected(CommandStatus),
    FauxSlave { address: LinkLayerAddress, channel: AdvertisingChannel },
    Transmit(TransmitReport),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Capture { end, stats } => {
                let how = match end {
                    CaptureEnd::Cancelled => "stopped",
                    CaptureEnd::Exhausted => "finished",
                };
                write!(f, "capture {}: {}", how, stats)
            }
            Outcome::AccessAddress(aa) => write!(f, "Access address: {}", aa),
            Outcome::AccessAddressSet(aa) => write!(f, "access address set to: {}", aa),
            Outcome::CrcVerify(on) => write!(f, "CRC: {}verify", if *on { "" } else { "DO NOT " }),
            Outcome::TargetSet(mac) => write!(f, "target set to: {}", mac),
            Outcome::TargetRejected(status) => write!(f, "target not set (status {})", status.0),
            Outcome::FauxSlave { address, channel } => {
                write!(f, "faux slave {} on channel {}", address, channel)
            }
            Outcome::Transmit(r) => {
                match r.current_channel {
                    Some(ch) => writeln!(f, "current channel: {}", ch)?,
                    None => writeln!(f, "channel setting error #{}", r.channel_status.0)?,
                }
                writeln!(f, "access address: {}", r.access_address)?;
                writeln!(f, "MAC address: {}", r.address)?;
                let len = r.adv_ind_adv_crc.len().saturating_sub(3);
                writeln!(f, "ADV_IND seed {:06x} ({}): {}", ADV_CRC_SEED, len, hex_bytes(&r.adv_ind_adv_crc))?;
                writeln!(f, "ADV_IND seed {:06x} ({}): {}", DATA_CRC_SEED, len, hex_bytes(&r.adv_ind_data_crc))?;
                if r.tx_status.is_ok() {
                    write!(f, "transmit started")
                } else {
                    write!(f, "Tx error #{}", r.tx_status.0)
                }
            }
        }
    }
}

/// Open every requested capture file. A second file for an already
/// open kind is warned about and skipped.
pub fn open_sinks(specs: &[SinkSpec]) -> Result<SinkRegistry, SessionError> {
    let mut registry = SinkRegistry::new();
    for spec in specs {
        registry.open_file(spec).map_err(|source| SessionError::Sink {
            path: spec.path.clone(),
            source,
        })?;
    }
    Ok(registry)
}

/// Capture from a recording: no device commands, runs until the
/// recording is exhausted or the session is cancelled.
pub fn replay<S: PacketSource + ?Sized>(
    source: &mut S,
    config: &SessionConfig,
    mut sinks: SinkRegistry,
    cancel: &CancellationToken,
) -> Result<Outcome, SessionError> {
    let verify = config.crc_policy != CrcPolicy::Disable;
    let mut dispatcher = Dispatcher::new(verify, config.expected_aa, config.budget);
    let opts = CaptureOptions {
        poll_interval: std::time::Duration::ZERO,
        stats: config.stats,
    };
    let result = run_capture(source, &mut dispatcher, &mut sinks, cancel, &opts);
    sinks.close_all();
    let end = result?;
    Ok(Outcome::Capture { end, stats: dispatcher.stats() })
}

/// Owns the device and the session's sinks and runs requested modes
/// against them one at a time.
pub struct Controller<R: Radio> {
    radio: R,
    sinks: SinkRegistry,
    config: SessionConfig,
    cancel: CancellationToken,
    state: ControllerState,
}

impl<R: Radio> Controller<R> {
    pub fn new(radio: R, config: SessionConfig, sinks: SinkRegistry, cancel: CancellationToken) -> Self {
        Self {
            radio,
            sinks,
            config,
            cancel,
            state: ControllerState::Idle,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    fn transition(&mut self, to: ControllerState) {
        if self.state != to {
            log::debug!("controller {:?} -> {:?}", self.state, to);
            self.state = to;
        }
    }

    /// Run `modes` in order, handing each outcome to `report`.
    /// A capture that was cancelled ends the plan.
    pub fn run_plan<F>(&mut self, modes: &[RequestedMode], mut report: F) -> Result<(), SessionError>
    where
        F: FnMut(&Outcome),
    {
        for mode in modes {
            let outcome = self.run(mode)?;
            report(&outcome);
            if matches!(outcome, Outcome::Capture { end: CaptureEnd::Cancelled, .. }) {
                break;
            }
        }
        Ok(())
    }

    /// Follow and promiscuous modes stream until cancelled; every other
    /// mode is a single exchange with the device.
    pub fn run(&mut self, mode: &RequestedMode) -> Result<Outcome, SessionError> {
        log::info!("mode: {}", mode);
        match *mode {
            RequestedMode::Follow { channel } => self.capture(Some(channel)),
            RequestedMode::Promiscuous => self.capture(None),
            RequestedMode::GetAccessAddress => {
                self.query(|c| c.radio.get_access_address().map(Outcome::AccessAddress))
            }
            RequestedMode::SetAccessAddress(aa) => self.query(|c| {
                c.radio.set_access_address(aa)?;
                Ok(Outcome::AccessAddressSet(aa))
            }),
            RequestedMode::CrcVerify(policy) => {
                self.query(|c| c.resolve_crc_policy(policy).map(Outcome::CrcVerify))
            }
            RequestedMode::SetTarget(mac) => self.query(|c| {
                let status = c.radio.set_target(&mac)?;
                Ok(if status.is_ok() {
                    Outcome::TargetSet(mac)
                } else {
                    Outcome::TargetRejected(status)
                })
            }),
            RequestedMode::FauxSlave { channel, address } => self.query(|c| {
                c.set_channel(channel)?;
                c.radio.faux_slave(&address)?;
                Ok(Outcome::FauxSlave { address, channel })
            }),
            RequestedMode::Transmit { channel, address } => {
                self.query(|c| c.transmit(channel, &address).map(Outcome::Transmit))
            }
        }
    }

    /// Close the sinks and hand the device back.
    pub fn finish(self) -> R {
        let Controller { radio, mut sinks, .. } = self;
        sinks.close_all();
        radio
    }

    fn set_channel(&mut self, channel: AdvertisingChannel) -> Result<CommandStatus, TransportError> {
        let status = self.radio.set_channel(channel.frequency())?;
        if !status.is_ok() {
            log::warn!("channel setting error #{} for {}", status.0, channel);
        }
        Ok(status)
    }

    /// Push or read the device CRC verification setting
    fn resolve_crc_policy(&mut self, policy: CrcPolicy) -> Result<bool, TransportError> {
        match policy {
            CrcPolicy::Enable => self.radio.set_crc_verify(true).map(|_| true),
            CrcPolicy::Disable => self.radio.set_crc_verify(false).map(|_| false),
            CrcPolicy::Query => self.radio.get_crc_verify(),
        }
    }

    /// `follow` is the channel to follow connections on; None is promiscuous.
    fn configure(&mut self, follow: Option<AdvertisingChannel>) -> Result<bool, TransportError> {
        self.radio.set_modulation(Modulation::BtLowEnergy)?;
        if let Some(channel) = follow {
            self.set_channel(channel)?;
        }
        let verify = self.resolve_crc_policy(self.config.crc_policy)?;
        match follow {
            Some(_) => self.radio.begin_follow(FOLLOW_SNIFF_PARAM)?,
            None => self.radio.begin_promiscuous()?,
        }
        Ok(verify)
    }

    fn capture(&mut self, follow: Option<AdvertisingChannel>) -> Result<Outcome, SessionError> {
        self.transition(ControllerState::Configuring);
        let verify = match self.configure(follow) {
            Ok(v) => v,
            Err(e) => {
                self.transition(ControllerState::Idle);
                return Err(e.into());
            }
        };
        log::info!("capturing, CRC {}verified", if verify { "" } else { "not " });

        self.transition(ControllerState::Capturing);
        let mut dispatcher = Dispatcher::new(verify, self.config.expected_aa, self.config.budget);
        let opts = CaptureOptions {
            poll_interval: self.config.poll_interval,
            stats: self.config.stats,
        };
        let result = run_capture(&mut self.radio, &mut dispatcher, &mut self.sinks, &self.cancel, &opts);

        self.transition(ControllerState::Draining);
        let stopped = self.radio.stop();
        self.sinks.close_all();
        self.transition(ControllerState::Idle);

        let end = match (result, stopped) {
            (Ok(end), Ok(())) => end,
            (Ok(_), Err(e)) => return Err(e.into()),
            (Err(e), stopped) => {
                log::error!("USB error: {}", e);
                if let Err(stop_err) = stopped {
                    log::warn!("stop after USB error also failed: {}", stop_err);
                }
                return Err(e.into());
            }
        };
        Ok(Outcome::Capture { end, stats: dispatcher.stats() })
    }

    fn query<F>(&mut self, exchange: F) -> Result<Outcome, SessionError>
    where
        F: FnOnce(&mut Self) -> Result<Outcome, TransportError>,
    {
        self.transition(ControllerState::Querying);
        let result = exchange(self);
        self.transition(ControllerState::Idle);
        Ok(result?)
    }

    fn transmit(&mut self, channel: AdvertisingChannel, address: &LinkLayerAddress) -> Result<TransmitReport, TransportError> {
        self.radio.set_modulation(Modulation::BtLowEnergy)?;
        let channel_status = self.set_channel(channel)?;
        let current_channel = if channel_status.is_ok() {
            Some(self.radio.get_channel()?)
        } else {
            None
        };
        let access_address = self.radio.get_access_address()?;

        let pdu = adv_ind(address, &TRANSMIT_ADV_DATA);
        let adv_ind_adv_crc = with_crc(&pdu, ADV_CRC_SEED);
        let adv_ind_data_crc = with_crc(&pdu, DATA_CRC_SEED);

        let tx_status = self.radio.transmit(address)?;
        if !tx_status.is_ok() {
            log::warn!("transmit returned status {}", tx_status.0);
        }

        Ok(TransmitReport {
            address: *address,
            channel_status,
            current_channel,
            access_address,
            adv_ind_adv_crc,
            adv_ind_data_crc,
            tx_status,
        })
    }
}
