// Copyright 2025-2026 CEMAXECUTER LLC

use std::os::raw::{c_int, c_void};

use bt_protocol::frame::USB_PKT_SIZE;
use bt_protocol::{AccessAddress, LinkLayerAddress, RawFrame};

use crate::{CommandStatus, Modulation, PacketSource, Polled, Radio, TransportError};

type DeviceHandle = c_void;

extern "C" {
    fn ubertooth_start(ubertooth_device: c_int) -> *mut DeviceHandle;
    fn cmd_stop(devh: *mut DeviceHandle) -> c_int;
    fn cmd_poll(devh: *mut DeviceHandle, p: *mut u8) -> c_int;
    fn cmd_set_modulation(devh: *mut DeviceHandle, modulation: u16) -> c_int;
    fn cmd_set_channel(devh: *mut DeviceHandle, channel: u16) -> c_int;
    fn cmd_get_channel(devh: *mut DeviceHandle) -> c_int;
    fn cmd_get_access_address(devh: *mut DeviceHandle) -> u32;
    fn cmd_set_access_address(devh: *mut DeviceHandle, access_address: u32) -> c_int;
    fn cmd_get_crc_verify(devh: *mut DeviceHandle) -> c_int;
    fn cmd_set_crc_verify(devh: *mut DeviceHandle, verify: c_int) -> c_int;
    fn cmd_btle_sniffing(devh: *mut DeviceHandle, num: u16) -> c_int;
    fn cmd_btle_promisc(devh: *mut DeviceHandle) -> c_int;
    fn cmd_btle_set_target(devh: *mut DeviceHandle, mac_address: *const u8) -> c_int;
    fn cmd_btle_slave(devh: *mut DeviceHandle, mac_address: *const u8) -> c_int;
    fn cmd_h_btle_tx(devh: *mut DeviceHandle, mac_address: *const u8) -> c_int;
}

// ubertooth_start claims interface 0 on the default libusb context
extern "C" {
    fn libusb_release_interface(devh: *mut DeviceHandle, interface_number: c_int) -> c_int;
    fn libusb_close(devh: *mut DeviceHandle);
    fn libusb_exit(ctx: *mut c_void);
}

/// Map a libubertooth return code (negative = libusb error) to a Result
fn check(op: &'static str, r: c_int) -> Result<c_int, TransportError> {
    if r < 0 {
        Err(TransportError::Usb { op, code: r })
    } else {
        Ok(r)
    }
}

/// Opened Ubertooth, driven through libubertooth.
/// The USB handle is released when this value is dropped. Dropping sends no
/// command to the device, so a one-shot mode keeps running after exit.
pub struct UbertoothDevice {
    devh: *mut DeviceHandle,
    index: i32,
}

// Device handle is only used from the owning thread
unsafe impl Send for UbertoothDevice {}

impl UbertoothDevice {
    /// Open device `index` (-1 selects the first one found).
    pub fn open(index: i32) -> Result<Self, TransportError> {
        let devh = unsafe { ubertooth_start(index) };
        if devh.is_null() {
            return Err(TransportError::DeviceNotFound(index));
        }
        log::info!("Ubertooth opened (index={})", index);
        Ok(Self { devh, index })
    }
}

impl PacketSource for UbertoothDevice {
    fn poll(&mut self) -> Result<Polled, TransportError> {
        let mut buf = [0u8; USB_PKT_SIZE];
        let r = check("poll", unsafe { cmd_poll(self.devh, buf.as_mut_ptr()) })?;
        if r as usize == USB_PKT_SIZE {
            Ok(Polled::Frame(RawFrame::from_bytes(buf)))
        } else {
            Ok(Polled::Idle)
        }
    }
}

impl Radio for UbertoothDevice {
    fn set_modulation(&mut self, modulation: Modulation) -> Result<(), TransportError> {
        check("set_modulation", unsafe { cmd_set_modulation(self.devh, modulation.code()) })?;
        Ok(())
    }

    fn set_channel(&mut self, channel: u16) -> Result<CommandStatus, TransportError> {
        let r = unsafe { cmd_set_channel(self.devh, channel) };
        Ok(CommandStatus(r))
    }

    fn get_channel(&mut self) -> Result<u16, TransportError> {
        let r = check("get_channel", unsafe { cmd_get_channel(self.devh) })?;
        Ok(r as u16)
    }

    fn get_access_address(&mut self) -> Result<AccessAddress, TransportError> {
        Ok(AccessAddress(unsafe { cmd_get_access_address(self.devh) }))
    }

    fn set_access_address(&mut self, aa: AccessAddress) -> Result<(), TransportError> {
        check("set_access_address", unsafe { cmd_set_access_address(self.devh, aa.value()) })?;
        Ok(())
    }

    fn get_crc_verify(&mut self) -> Result<bool, TransportError> {
        let r = check("get_crc_verify", unsafe { cmd_get_crc_verify(self.devh) })?;
        Ok(r != 0)
    }

    fn set_crc_verify(&mut self, verify: bool) -> Result<(), TransportError> {
        check("set_crc_verify", unsafe { cmd_set_crc_verify(self.devh, verify as c_int) })?;
        Ok(())
    }

    fn begin_follow(&mut self, param: u16) -> Result<(), TransportError> {
        check("btle_sniffing", unsafe { cmd_btle_sniffing(self.devh, param) })?;
        Ok(())
    }

    fn begin_promiscuous(&mut self) -> Result<(), TransportError> {
        check("btle_promisc", unsafe { cmd_btle_promisc(self.devh) })?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        check("stop", unsafe { cmd_stop(self.devh) })?;
        Ok(())
    }

    fn set_target(&mut self, mac: &LinkLayerAddress) -> Result<CommandStatus, TransportError> {
        let octets = mac.octets();
        let r = unsafe { cmd_btle_set_target(self.devh, octets.as_ptr()) };
        Ok(CommandStatus(r))
    }

    fn faux_slave(&mut self, mac: &LinkLayerAddress) -> Result<(), TransportError> {
        let octets = mac.octets();
        check("btle_slave", unsafe { cmd_btle_slave(self.devh, octets.as_ptr()) })?;
        Ok(())
    }

    fn transmit(&mut self, mac: &LinkLayerAddress) -> Result<CommandStatus, TransportError> {
        let octets = mac.octets();
        let r = unsafe { cmd_h_btle_tx(self.devh, octets.as_ptr()) };
        Ok(CommandStatus(r))
    }
}

impl Drop for UbertoothDevice {
    fn drop(&mut self) {
        unsafe {
            libusb_release_interface(self.devh, 0);
            libusb_close(self.devh);
            libusb_exit(std::ptr::null_mut());
        }
        log::info!("Ubertooth {} released", self.index);
    }
}
