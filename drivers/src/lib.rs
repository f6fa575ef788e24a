/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the CRYP driver library.

--*/

#![cfg_attr(not(any(feature = "std", test)), no_std)]

mod array;
mod cryp;
mod device;
mod dma;
pub mod printer;
mod wait;

cfg_if::cfg_if! {
    if #[cfg(test)] {
        mod emu;
    }
}

pub use cryp_error::{CrypError, CrypResult};

pub use array::{Array4x2, Array4x4, Array4x6, Array4x8};
pub use cryp::{Algo, Cryp, DataUnit, Direction, KeySize, ProvisioningMode, Usage};
pub use device::{DeviceHandle, DevicePort, DeviceSpec, MapMode};
pub use dma::{
    DmaBurst, DmaDataSize, DmaDescriptor, DmaDirection, DmaFlowControl, DmaHandler, DmaMode,
    DmaPort, DmaPriority, DmaReconf, DmaRequest, DmaStatus, CRYP_DMA_CHANNEL, CRYP_DMA_CONTROLLER,
    CRYP_DMA_STREAM_IN, CRYP_DMA_STREAM_OUT,
};
