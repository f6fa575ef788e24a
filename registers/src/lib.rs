// Licensed under the Apache-2.0 license.
//
// Register definitions for the CRYP symmetric-cipher accelerator.
#![no_std]
#![allow(clippy::erasing_op)]
#![allow(clippy::identity_op)]

pub mod cryp;
