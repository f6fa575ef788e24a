/*++

Licensed under the Apache-2.0 license.

File Name:

    device.rs

Abstract:

    Lifecycle of the peripheral's register window: registration with the
    platform's device-access service and idempotent map/unmap tracking.

--*/

use crate::CrypResult;
use cryp_error::CrypError;

/// When the platform should make the register window addressable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MapMode {
    /// Map once during initialization.
    Auto,
    /// Defer mapping until the owner asks for it.
    Voluntary,
}

/// Registration request for a peripheral register window.
#[derive(Clone, Copy, Debug)]
pub struct DeviceSpec {
    pub name: &'static str,
    pub base: usize,
    pub size: usize,
    pub map_mode: MapMode,
}

/// Opaque handle identifying a registered device window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceHandle(u32);

impl DeviceHandle {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Platform service that grants a process access to a memory-mapped
/// peripheral. Failures propagate unchanged; retry policy belongs to the
/// caller.
pub trait DevicePort {
    fn request_access(&mut self, spec: &DeviceSpec) -> CrypResult<DeviceHandle>;
    fn map(&mut self, device: DeviceHandle) -> CrypResult<()>;
    fn unmap(&mut self, device: DeviceHandle) -> CrypResult<()>;
}

/// Mapping state for one device window.
///
/// `map`/`unmap` are idempotent: the underlying platform call is issued at
/// most once per state change, and repeating a call in the same state is a
/// successful no-op.
pub(crate) struct DeviceState {
    handle: Option<DeviceHandle>,
    mapped: bool,
}

impl DeviceState {
    pub(crate) fn new() -> Self {
        Self {
            handle: None,
            mapped: false,
        }
    }

    pub(crate) fn register(
        &mut self,
        port: &mut dyn DevicePort,
        spec: &DeviceSpec,
    ) -> CrypResult<()> {
        self.handle = Some(port.request_access(spec)?);
        if spec.map_mode == MapMode::Auto {
            self.map(port)?;
        }
        Ok(())
    }

    pub(crate) fn map(&mut self, port: &mut dyn DevicePort) -> CrypResult<()> {
        if self.mapped {
            return Ok(());
        }
        let handle = self
            .handle
            .ok_or(CrypError::DRIVER_CRYP_DEVICE_NOT_REGISTERED)?;
        port.map(handle)?;
        self.mapped = true;
        Ok(())
    }

    pub(crate) fn unmap(&mut self, port: &mut dyn DevicePort) -> CrypResult<()> {
        if !self.mapped {
            return Ok(());
        }
        let handle = self
            .handle
            .ok_or(CrypError::DRIVER_CRYP_DEVICE_NOT_REGISTERED)?;
        port.unmap(handle)?;
        self.mapped = false;
        Ok(())
    }

    pub(crate) fn is_mapped(&self) -> bool {
        self.mapped
    }
}
