/*++

Licensed under the Apache-2.0 license.

File Name:

    emu.rs

Abstract:

    Test-only emulation of the CRYP register bus and of the external
    collaborator ports. The model implements the accelerator's FIFO, busy
    and key-preparation semantics well enough to verify the driver's
    register protocol; the cipher itself is a word-wise involution so that
    encrypt and decrypt are the same transform.

--*/

use crate::cryp::{Cryp, ProvisioningMode, Usage};
use crate::device::{DeviceHandle, DevicePort, DeviceSpec};
use crate::dma::{
    DmaDescriptor, DmaDirection, DmaPort, DmaPriority, DmaReconf, DmaRequest,
};
use crate::CrypResult;
use cryp_error::CrypError;
use cryp_registers::cryp::RegisterBlock;
use mreg::{Mmio, MmioMut};
use std::cell::RefCell;
use std::collections::VecDeque;

pub const EMU_BASE: usize = 0x5006_0000;

const CR_ALGOMODE_KEY_PREPARE: u32 = 7;
const CR_FFLUSH: u32 = 1 << 14;
const CR_CRYPEN: u32 = 1 << 15;

/// How many status reads the engine stays busy after a key-preparation pass
/// is started.
const KEY_PREPARE_BUSY_READS: u32 = 3;

pub struct CrypModel {
    pub cr: u32,
    pub dmacr: u32,
    pub imscr: u32,
    /// Key register words by offset: [K0L, K0R, K1L, K1R, K2L, K2R, K3L, K3R]
    pub key: [u32; 8],
    /// IV register words by offset: [IV0L, IV0R, IV1L, IV1R]
    pub iv: [u32; 4],
    in_fifo: VecDeque<u32>,
    out_fifo: VecDeque<u32>,
    busy_reads: u32,
    /// Completed key-preparation passes (CRYPEN rising with ALGOMODE=7).
    pub key_prepare_runs: u32,
    /// Control register writes observed while the engine reported busy.
    pub busy_violations: u32,
    rounds: Vec<(usize, usize)>,
    cur_push: usize,
    cur_pop: usize,
}

impl CrypModel {
    pub fn new() -> Self {
        Self {
            cr: 0,
            dmacr: 0,
            imscr: 0,
            key: [0; 8],
            iv: [0; 4],
            in_fifo: VecDeque::new(),
            out_fifo: VecDeque::new(),
            busy_reads: 0,
            key_prepare_runs: 0,
            busy_violations: 0,
            rounds: Vec::new(),
            cur_push: 0,
            cur_pop: 0,
        }
    }

    /// Push garbage into both FIFOs, as a prior aborted operation would.
    pub fn seed_stale_fifos(&mut self) {
        self.in_fifo.push_back(0x5a5a_5a5a);
        self.out_fifo.push_back(0xa5a5_a5a5);
    }

    pub fn fifo_depths(&self) -> (usize, usize) {
        (self.in_fifo.len(), self.out_fifo.len())
    }

    /// Per-round (words pushed, words popped) history, including the round
    /// in progress.
    pub fn rounds(&mut self) -> Vec<(usize, usize)> {
        if self.cur_push > 0 || self.cur_pop > 0 {
            self.rounds.push((self.cur_push, self.cur_pop));
            self.cur_push = 0;
            self.cur_pop = 0;
        }
        self.rounds.clone()
    }

    fn crypen(&self) -> bool {
        self.cr & CR_CRYPEN != 0
    }

    fn algomode(&self) -> u32 {
        (self.cr >> 3) & 7
    }

    /// Move complete states from the input FIFO to the output FIFO. The
    /// transform is a word-wise involution, so direction does not matter.
    fn process(&mut self) {
        while self.in_fifo.len() >= 4
            && self.crypen()
            && self.algomode() != CR_ALGOMODE_KEY_PREPARE
        {
            for _ in 0..4 {
                let word = self.in_fifo.pop_front().unwrap();
                self.out_fifo.push_back(!word);
            }
        }
    }

    fn read(&mut self, offset: usize) -> u32 {
        match offset {
            0x00 => self.cr,
            0x04 => {
                let mut sr = 0;
                if self.busy_reads > 0 {
                    self.busy_reads -= 1;
                    sr |= 1 << 4;
                }
                if self.in_fifo.is_empty() {
                    sr |= 1 << 0;
                }
                if self.in_fifo.len() < 8 {
                    sr |= 1 << 1;
                }
                if !self.out_fifo.is_empty() {
                    sr |= 1 << 2;
                }
                if self.out_fifo.len() >= 8 {
                    sr |= 1 << 3;
                }
                sr
            }
            0x0c => {
                self.cur_pop += 1;
                self.out_fifo.pop_front().unwrap_or(0)
            }
            0x10 => self.dmacr,
            0x14 => self.imscr,
            0x18 | 0x1c => 0,
            0x20..=0x3c => self.key[(offset - 0x20) / 4],
            0x40..=0x4c => self.iv[(offset - 0x40) / 4],
            _ => panic!("cryp model: read at {offset:#x}"),
        }
    }

    fn write(&mut self, offset: usize, val: u32) {
        match offset {
            0x00 => {
                if self.busy_reads > 0 {
                    self.busy_violations += 1;
                }
                let old = self.cr;
                let mut val = val;
                if val & CR_FFLUSH != 0 {
                    self.in_fifo.clear();
                    self.out_fifo.clear();
                    val &= !CR_FFLUSH;
                }
                self.cr = val;
                let enable_edge = old & CR_CRYPEN == 0 && val & CR_CRYPEN != 0;
                if enable_edge && self.algomode() == CR_ALGOMODE_KEY_PREPARE {
                    self.key_prepare_runs += 1;
                    self.busy_reads = KEY_PREPARE_BUSY_READS;
                }
                self.process();
            }
            0x08 => {
                if self.cur_pop > 0 {
                    self.rounds.push((self.cur_push, self.cur_pop));
                    self.cur_push = 0;
                    self.cur_pop = 0;
                }
                self.in_fifo.push_back(val);
                self.cur_push += 1;
                self.process();
            }
            0x10 => self.dmacr = val,
            0x14 => self.imscr = val,
            0x20..=0x3c => self.key[(offset - 0x20) / 4] = val,
            0x40..=0x4c => self.iv[(offset - 0x40) / 4] = val,
            _ => panic!("cryp model: write at {offset:#x}"),
        }
    }
}

#[derive(Clone, Copy)]
pub struct EmuMmio<'a> {
    pub model: &'a RefCell<CrypModel>,
}

impl Mmio for EmuMmio<'_> {
    unsafe fn read_volatile(&self, src: *const u32) -> u32 {
        self.model.borrow_mut().read(src as usize - EMU_BASE)
    }
}

impl MmioMut for EmuMmio<'_> {
    unsafe fn write_volatile(&self, dst: *mut u32, val: u32) {
        self.model.borrow_mut().write(dst as usize - EMU_BASE, val)
    }
}

pub fn new_cryp(
    model: &RefCell<CrypModel>,
    usage: Usage,
    mode: ProvisioningMode,
) -> Cryp<EmuMmio<'_>> {
    let regs = unsafe { RegisterBlock::new_with_mmio(EMU_BASE as *mut u32, EmuMmio { model }) };
    Cryp::with_register_block(regs, EMU_BASE, usage, mode)
}

pub struct MockDevicePort {
    pub request_calls: u32,
    pub map_calls: u32,
    pub unmap_calls: u32,
    pub deny: bool,
    pub last_spec_size: usize,
}

impl MockDevicePort {
    pub fn new() -> Self {
        Self {
            request_calls: 0,
            map_calls: 0,
            unmap_calls: 0,
            deny: false,
            last_spec_size: 0,
        }
    }
}

impl DevicePort for MockDevicePort {
    fn request_access(&mut self, spec: &DeviceSpec) -> CrypResult<DeviceHandle> {
        if self.deny {
            return Err(CrypError::DRIVER_CRYP_DEVICE_ACCESS_DENIED);
        }
        self.request_calls += 1;
        self.last_spec_size = spec.size;
        Ok(DeviceHandle::new(7))
    }

    fn map(&mut self, _device: DeviceHandle) -> CrypResult<()> {
        self.map_calls += 1;
        Ok(())
    }

    fn unmap(&mut self, _device: DeviceHandle) -> CrypResult<()> {
        self.unmap_calls += 1;
        Ok(())
    }
}

pub struct StreamRecord {
    pub stream: u8,
    pub direction: DmaDirection,
    pub src: usize,
    pub dst: usize,
    pub size: usize,
    pub priority: DmaPriority,
    pub has_handler: bool,
}

impl StreamRecord {
    fn from_request(request: &DmaRequest) -> Self {
        Self {
            stream: request.stream,
            direction: request.direction,
            src: request.src,
            dst: request.dst,
            size: request.size,
            priority: request.priority,
            has_handler: request.handler.is_some(),
        }
    }
}

pub struct ReconfRecord {
    pub descriptor: DmaDescriptor,
    pub fields: DmaReconf,
    pub request: StreamRecord,
}

pub struct MockDmaPort {
    pub registered: Vec<StreamRecord>,
    pub reconfigs: Vec<ReconfRecord>,
    pub deny: bool,
    next_descriptor: u32,
}

impl MockDmaPort {
    pub fn new() -> Self {
        Self {
            registered: Vec::new(),
            reconfigs: Vec::new(),
            deny: false,
            next_descriptor: 0,
        }
    }
}

impl DmaPort for MockDmaPort {
    fn register_stream(&mut self, request: &DmaRequest) -> CrypResult<DmaDescriptor> {
        if self.deny {
            return Err(CrypError::DRIVER_CRYP_DMA_REJECTED);
        }
        self.registered.push(StreamRecord::from_request(request));
        let descriptor = DmaDescriptor::new(self.next_descriptor);
        self.next_descriptor += 1;
        Ok(descriptor)
    }

    fn reconfigure(
        &mut self,
        descriptor: DmaDescriptor,
        request: &DmaRequest,
        fields: DmaReconf,
    ) -> CrypResult<()> {
        self.reconfigs.push(ReconfRecord {
            descriptor,
            fields,
            request: StreamRecord::from_request(request),
        });
        Ok(())
    }
}
