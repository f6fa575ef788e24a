/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Error codes used by the CRYP driver stack.

--*/

#![cfg_attr(not(any(feature = "std", test)), no_std)]

use core::num::NonZeroU32;

/// CRYP driver error.
///
/// Codes are partitioned by component: `0x0001_xxxx` engine configuration,
/// `0x0002_xxxx` DMA transfer engine, `0x0003_xxxx` device lifecycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CrypError(pub NonZeroU32);

pub type CrypResult<T> = Result<T, CrypError>;

impl CrypError {
    /// Intended for const contexts only; `CrypError::try_from` is the runtime
    /// conversion and never panics.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("CrypError cannot be 0"),
        }
    }

    /// Key buffer shorter than the selected key size
    pub const DRIVER_CRYP_INVALID_KEY_SIZE: CrypError = CrypError::new_const(0x0001_0001);

    /// Key injection attempted from the user privilege domain
    pub const DRIVER_CRYP_KEY_NOT_PERMITTED: CrypError = CrypError::new_const(0x0001_0002);

    /// Output slice shorter than input slice
    pub const DRIVER_CRYP_INVALID_SLICE: CrypError = CrypError::new_const(0x0001_0003);

    /// DMA transfer requested before stream registration
    pub const DRIVER_CRYP_DMA_NOT_INITIALIZED: CrypError = CrypError::new_const(0x0002_0001);

    /// DMA source buffer not word aligned
    pub const DRIVER_CRYP_DMA_UNALIGNED_SOURCE: CrypError = CrypError::new_const(0x0002_0002);

    /// DMA destination buffer not word aligned
    pub const DRIVER_CRYP_DMA_UNALIGNED_DEST: CrypError = CrypError::new_const(0x0002_0003);

    /// DMA engine rejected a stream registration or reconfiguration
    pub const DRIVER_CRYP_DMA_REJECTED: CrypError = CrypError::new_const(0x0002_0004);

    /// Register access attempted while the device window is unmapped
    pub const DRIVER_CRYP_DEVICE_NOT_MAPPED: CrypError = CrypError::new_const(0x0003_0001);

    /// Map/unmap attempted before device registration
    pub const DRIVER_CRYP_DEVICE_NOT_REGISTERED: CrypError = CrypError::new_const(0x0003_0002);

    /// Platform refused access to the peripheral window
    pub const DRIVER_CRYP_DEVICE_ACCESS_DENIED: CrypError = CrypError::new_const(0x0003_0003);
}

impl From<CrypError> for u32 {
    fn from(val: CrypError) -> Self {
        val.0.get()
    }
}

impl From<CrypError> for NonZeroU32 {
    fn from(val: CrypError) -> Self {
        val.0
    }
}

impl TryFrom<u32> for CrypError {
    type Error = ();

    fn try_from(val: u32) -> Result<Self, ()> {
        match NonZeroU32::new(val) {
            Some(val) => Ok(CrypError(val)),
            None => Err(()),
        }
    }
}
