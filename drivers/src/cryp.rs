/*++

Licensed under the Apache-2.0 license.

File Name:

    cryp.rs

Abstract:

    Driver for the CRYP symmetric-cipher accelerator: engine configuration
    state machine and the two data-pump strategies (FIFO polling and
    DMA-assisted streaming).

    The accelerator holds all cipher state in its own registers; the only
    shadow state this driver keeps is the provisioning mode and the device
    mapping flag. Configuration writes are gated on the engine reporting not
    busy, and the configure sequence below is order-sensitive: deviating from
    it corrupts the first block of a transfer.

--*/

use crate::device::{DevicePort, DeviceSpec, DeviceState, MapMode};
use crate::dma::{self, DmaDescriptor, DmaHandler, DmaPort, DmaReconf};
use crate::{cprintln, wait, Array4x2, Array4x4, Array4x6, Array4x8, CrypResult};
use cryp_error::CrypError;
use cryp_registers::cryp::{CrypReg, RegisterBlock};
use mreg::{MmioMut, RealMmioMut};

const BLOCK_SIZE_BYTES: usize = 16;
const DIN_OFFSET: usize = 0x08;
const DOUT_OFFSET: usize = 0x0c;

/// Register window sizes per privilege domain. The user window stops short
/// of the key registers; only the configurator maps them.
const USER_WINDOW_SIZE: usize = 0x100;
const CONFIG_WINDOW_SIZE: usize = 0x1000;

/// Cipher algorithm and chaining mode; values are the ALGOMODE encodings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Algo {
    TdesEcb = 0,
    TdesCbc = 1,
    DesEcb = 2,
    DesCbc = 3,
    AesEcb = 4,
    AesCbc = 5,
    AesCtr = 6,
    AesKeyPrepare = 7,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// AES key width; values are the KEYSIZE encodings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeySize {
    Bits128 = 0,
    Bits192 = 1,
    Bits256 = 2,
}

impl KeySize {
    pub fn bytes(&self) -> usize {
        match self {
            KeySize::Bits128 => 16,
            KeySize::Bits192 => 24,
            KeySize::Bits256 => 32,
        }
    }
}

/// Swap granularity applied by the accelerator to data words; values are the
/// DATATYPE encodings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataUnit {
    Word = 0,
    HalfWord = 1,
    Byte = 2,
    Bit = 3,
}

/// Key provisioning policy: relayed over an inter-process channel (bench) or
/// injected by the configurator from a secure element (prod). The transport
/// itself is outside this driver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProvisioningMode {
    Bench,
    Prod,
}

/// Privilege domain of the owning process. Only the configurator domain may
/// inject raw key material.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Usage {
    User,
    Config,
}

impl Usage {
    fn window_size(&self) -> usize {
        match self {
            Usage::User => USER_WINDOW_SIZE,
            Usage::Config => CONFIG_WINDOW_SIZE,
        }
    }
}

/// CRYP accelerator driver. One instance per process; the peripheral's
/// registers are the single point of truth and this driver adds no internal
/// locking. Callers needing concurrent operations must serialize externally.
pub struct Cryp<TMmio: MmioMut + Copy = RealMmioMut> {
    regs: RegisterBlock<TMmio>,
    base: usize,
    usage: Usage,
    mode: ProvisioningMode,
    device: DeviceState,
    dma_in: Option<DmaDescriptor>,
    dma_out: Option<DmaDescriptor>,
}

impl Cryp<RealMmioMut> {
    pub fn new(reg: CrypReg, usage: Usage, mode: ProvisioningMode) -> Self {
        let mut reg = reg;
        let regs = reg.regs_mut();
        Self::with_register_block(regs, CrypReg::PTR as usize, usage, mode)
    }
}

impl<TMmio: MmioMut + Copy> Cryp<TMmio> {
    /// Construct over an explicit register block. This is the seam used by
    /// emulated buses; hardware callers go through [`Cryp::new`].
    pub fn with_register_block(
        regs: RegisterBlock<TMmio>,
        base: usize,
        usage: Usage,
        mode: ProvisioningMode,
    ) -> Self {
        Self {
            regs,
            base,
            usage,
            mode,
            device: DeviceState::new(),
            dma_in: None,
            dma_out: None,
        }
    }

    pub fn provisioning_mode(&self) -> ProvisioningMode {
        self.mode
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// One-time process-start initialization: registers the register window
    /// with the platform (mapping it immediately in [`MapMode::Auto`]) and,
    /// when a DMA port is supplied, registers the two unidirectional stream
    /// templates. Buffers and sizes are patched in per transfer.
    pub fn early_init(
        &mut self,
        devices: &mut dyn DevicePort,
        dma: Option<&mut dyn DmaPort>,
        map_mode: MapMode,
    ) -> CrypResult<()> {
        let spec = DeviceSpec {
            name: "cryp",
            base: self.base,
            size: self.usage.window_size(),
            map_mode,
        };
        cprintln!("cryp: registering device window");
        self.device.register(devices, &spec)?;

        if let Some(port) = dma {
            cprintln!("cryp: registering dma streams");
            self.dma_in = Some(port.register_stream(&dma::input_stream(self.din_addr(), None))?);
            self.dma_out = Some(port.register_stream(&dma::output_stream(self.dout_addr(), None))?);
        }
        Ok(())
    }

    /// Map the register window. Idempotent; see [`DeviceSpec::map_mode`] for
    /// the voluntary-map flow.
    pub fn map(&mut self, devices: &mut dyn DevicePort) -> CrypResult<()> {
        self.device.map(devices)
    }

    /// Unmap the register window. Idempotent.
    pub fn unmap(&mut self, devices: &mut dyn DevicePort) -> CrypResult<()> {
        self.device.unmap(devices)
    }

    pub fn is_mapped(&self) -> bool {
        self.device.is_mapped()
    }

    /// Full engine configuration. The step order is the correctness contract
    /// of this driver and must not be reordered:
    ///
    /// 1. disable the engine
    /// 2. write the IV, if supplied
    /// 3. write the key, if supplied
    /// 4. set byte data granularity
    /// 5. set the direction
    /// 6. run the key-preparation pass (key present, decrypt, non-counter)
    /// 7. set the target algorithm
    /// 8. enable the engine and flush stale FIFO contents
    ///
    /// A caller in the user privilege domain passes `key: None` and relies on
    /// a prior out-of-band injection. The key buffer is not retained; zeroing
    /// it after use is the caller's obligation.
    pub fn configure(
        &mut self,
        key: Option<&[u8]>,
        key_size: KeySize,
        iv: Option<&[u8]>,
        algo: Algo,
        dir: Direction,
    ) -> CrypResult<()> {
        self.ensure_mapped()?;
        // Fail fast on key preconditions before any register is touched.
        if let Some(key) = key {
            self.key_preflight(key, key_size)?;
        }
        self.disable();

        if let Some(iv) = iv {
            self.wait_idle();
            self.set_iv(iv);
        }
        if let Some(key) = key {
            self.wait_idle();
            self.set_key(key, key_size)?;
        }

        self.wait_idle();
        self.set_data_unit(DataUnit::Byte);
        self.set_direction(dir);

        // The hardware key schedule must be derived before decryption in
        // every mode except counter mode.
        if key.is_some() && dir == Direction::Decrypt && algo != Algo::AesCtr {
            self.set_algo(Algo::AesKeyPrepare);
            self.enable();
            self.wait_idle();
        }

        self.set_algo(algo);
        self.enable();
        self.flush_fifos();
        Ok(())
    }

    /// User-domain configuration: algorithm, direction and IV only. Key
    /// registers are never touched (the user window does not map them).
    pub fn configure_user(
        &mut self,
        iv: Option<&[u8]>,
        algo: Algo,
        dir: Direction,
    ) -> CrypResult<()> {
        self.ensure_mapped()?;
        self.wait_idle();
        self.set_data_unit(DataUnit::Byte);
        self.set_algo(algo);
        self.set_direction(dir);

        if let Some(iv) = iv {
            self.wait_idle();
            self.set_iv(iv);
        }

        self.enable();
        self.flush_fifos();
        Ok(())
    }

    /// Configurator-domain key injection: key only, leaving the user's
    /// algorithm/direction/IV choices untouched.
    pub fn configure_injector(&mut self, key: Option<&[u8]>, key_size: KeySize) -> CrypResult<()> {
        self.ensure_mapped()?;
        if let Some(key) = key {
            self.set_key(key, key_size)?;
        }
        self.wait_idle();
        self.enable();
        self.flush_fifos();
        Ok(())
    }

    /// Stream key material into the key register pairs.
    ///
    /// The accelerator expects the most-significant words in the
    /// highest-numbered pair, written first, with each 32-bit chunk converted
    /// to big-endian: the walk runs backward from the end of the buffer
    /// through pairs 3, 2, 1, 0, and pairs 0/1 are only written for the
    /// longer key sizes. An empty slice is a no-op; a slice shorter than
    /// `key_size` is rejected. The buffer is not retained and the caller is
    /// responsible for zeroing it.
    pub fn set_key(&mut self, key: &[u8], key_size: KeySize) -> CrypResult<()> {
        self.key_preflight(key, key_size)?;
        if key.is_empty() {
            return Ok(());
        }

        self.wait_idle();
        self.regs.cr().modify(|w| w.keysize(key_size as u32));

        match key_size {
            KeySize::Bits128 => {
                let words = Array4x4::from(<&[u8; 16]>::try_from(&key[..16]).unwrap());
                self.write_key_pairs(&words.0);
            }
            KeySize::Bits192 => {
                let words = Array4x6::from(<&[u8; 24]>::try_from(&key[..24]).unwrap());
                self.write_key_pairs(&words.0);
            }
            KeySize::Bits256 => {
                let words = Array4x8::from(<&[u8; 32]>::try_from(&key[..32]).unwrap());
                self.write_key_pairs(&words.0);
            }
        }
        Ok(())
    }

    /// An empty key slice is the "key omitted" case and passes.
    fn key_preflight(&self, key: &[u8], key_size: KeySize) -> CrypResult<()> {
        if key.is_empty() {
            return Ok(());
        }
        if self.usage != Usage::Config {
            return Err(CrypError::DRIVER_CRYP_KEY_NOT_PERMITTED);
        }
        if key.len() < key_size.bytes() {
            return Err(CrypError::DRIVER_CRYP_INVALID_KEY_SIZE);
        }
        Ok(())
    }

    /// Most-significant pair first, right register before left within a pair.
    fn write_key_pairs(&mut self, words: &[u32]) {
        let pairs = words.len() / 2;
        for j in 0..pairs {
            let block = self.regs.key(3 - j);
            block.rr().write(|_| words[words.len() - 1 - 2 * j]);
            block.lr().write(|_| words[words.len() - 2 - 2 * j]);
        }
    }

    /// Write the initialization vector: 8 bytes for the DES family, 16 for
    /// AES. Any other length is rejected as a silent no-op, leaving the IV
    /// registers unmodified. The buffer is not retained.
    pub fn set_iv(&mut self, iv: &[u8]) {
        match iv.len() {
            8 => {
                let words = Array4x2::from(<&[u8; 8]>::try_from(iv).unwrap());
                let iv0 = self.regs.iv(0);
                iv0.lr().write(|_| words.0[0]);
                iv0.rr().write(|_| words.0[1]);
            }
            16 => {
                let words = Array4x4::from(<&[u8; 16]>::try_from(iv).unwrap());
                let iv0 = self.regs.iv(0);
                iv0.lr().write(|_| words.0[0]);
                iv0.rr().write(|_| words.0[1]);
                let iv1 = self.regs.iv(1);
                iv1.lr().write(|_| words.0[2]);
                iv1.rr().write(|_| words.0[3]);
            }
            _ => (),
        }
    }

    /// Read the running IV back; counter-mode callers persist it between
    /// calls. Length rules mirror [`Cryp::set_iv`].
    pub fn get_iv(&self, iv: &mut [u8]) {
        match iv.len() {
            8 => {
                let iv0 = self.regs.iv(0);
                let words = Array4x2::from([iv0.lr().read(), iv0.rr().read()]);
                iv.copy_from_slice(&<[u8; 8]>::from(words));
            }
            16 => {
                let iv0 = self.regs.iv(0);
                let iv1 = self.regs.iv(1);
                let words = Array4x4::from([
                    iv0.lr().read(),
                    iv0.rr().read(),
                    iv1.lr().read(),
                    iv1.rr().read(),
                ]);
                iv.copy_from_slice(&<[u8; 16]>::from(words));
            }
            _ => (),
        }
    }

    pub fn get_direction(&self) -> Direction {
        if self.regs.cr().read().algodir() {
            Direction::Decrypt
        } else {
            Direction::Encrypt
        }
    }

    /// True when the engine's configured direction differs from `dir`;
    /// callers use this to decide whether a reconfiguration is needed before
    /// reuse.
    pub fn direction_changed(&self, dir: Direction) -> bool {
        self.get_direction() != dir
    }

    pub fn set_data_unit(&mut self, unit: DataUnit) {
        self.regs.cr().modify(|w| w.datatype(unit as u32));
    }

    fn set_direction(&mut self, dir: Direction) {
        self.regs
            .cr()
            .modify(|w| w.algodir(dir == Direction::Decrypt));
    }

    fn set_algo(&mut self, algo: Algo) {
        self.regs.cr().modify(|w| w.algomode(algo as u32));
        self.wait_idle();
    }

    pub fn enable(&mut self) {
        self.regs.cr().modify(|w| w.crypen(true));
    }

    pub fn disable(&mut self) {
        self.regs.cr().modify(|w| w.crypen(false));
    }

    pub fn enable_dma(&mut self) {
        self.regs.dmacr().modify(|w| w.dien(true).doen(true));
    }

    pub fn disable_dma(&mut self) {
        self.regs.dmacr().modify(|w| w.dien(false).doen(false));
    }

    /// Discard stale FIFO contents from a prior operation. Must run after
    /// every enable, before the first data word. FFLUSH is self-clearing and
    /// not readable, so completion is observed through the FIFO level flags.
    pub fn flush_fifos(&mut self) {
        self.regs.cr().modify(|w| w.fflush(true));
        wait::until(|| {
            let sr = self.regs.sr().read();
            sr.ifem() && !sr.ofne()
        });
    }

    /// Block until the engine reports not busy. Unbounded and
    /// non-cancellable by design; a wedged peripheral parks the caller here.
    pub fn wait_idle(&self) {
        wait::until(|| !self.regs.sr().read().busy());
    }

    /// Pump `input` through the engine by polling the FIFO flags, writing the
    /// result to `output`. Synchronous: every full input block has been
    /// transformed into `output` when this returns.
    ///
    /// The FIFO is eight words deep, so each round pushes two 128-bit blocks
    /// when at least two full blocks remain and one otherwise. Trailing bytes
    /// beyond the last full block are left untouched; callers pre-pad.
    pub fn transfer_blocking(&mut self, input: &[u8], output: &mut [u8]) -> CrypResult<()> {
        self.ensure_mapped()?;
        if output.len() < input.len() {
            return Err(CrypError::DRIVER_CRYP_INVALID_SLICE);
        }

        self.enable();

        let blocks = input.len() / BLOCK_SIZE_BYTES;
        let mut block = 0;
        while block < blocks {
            let states = (blocks - block).min(2);
            let words = 4 * states;
            let base = block * BLOCK_SIZE_BYTES;

            for i in 0..words {
                let off = base + i * 4;
                let word = u32::from_le_bytes(input[off..off + 4].try_into().unwrap());
                self.regs.din().write(|_| word);
            }

            wait::until(|| self.regs.sr().read().ofne());

            for i in 0..words {
                let off = base + i * 4;
                output[off..off + 4].copy_from_slice(&self.regs.dout().read().to_le_bytes());
            }

            wait::until(|| self.regs.sr().read().ifnf());
            block += states;
        }

        self.wait_idle();
        Ok(())
    }

    /// Bind completion handlers and transfer parameters into the stream
    /// templates registered by [`Cryp::early_init`]. Descriptor allocation is
    /// the expensive phase; after this, per-transfer calls patch only buffer
    /// addresses and size.
    pub fn init_dma(
        &mut self,
        port: &mut dyn DmaPort,
        in_handler: &'static dyn DmaHandler,
        out_handler: &'static dyn DmaHandler,
    ) -> CrypResult<()> {
        let (dma_in, dma_out) = self.dma_descriptors()?;
        self.disable_dma();

        let fields = DmaReconf::HANDLERS | DmaReconf::MODE | DmaReconf::PRIORITY;
        cprintln!("cryp: binding dma in stream");
        port.reconfigure(
            dma_in,
            &dma::input_stream(self.din_addr(), Some(in_handler)),
            fields,
        )?;
        cprintln!("cryp: binding dma out stream");
        port.reconfigure(
            dma_out,
            &dma::output_stream(self.dout_addr(), Some(out_handler)),
            fields,
        )?;

        self.enable_dma();
        Ok(())
    }

    /// Hand the transfer to the external DMA engine and return as soon as
    /// both descriptors are accepted; data has not moved yet. Completion is
    /// signaled through the handlers bound by [`Cryp::init_dma`], whose input
    /// and output events arrive independently and in either order. Reading
    /// `output` before both have fired yields undefined contents.
    pub fn transfer_async(
        &mut self,
        port: &mut dyn DmaPort,
        input: &[u8],
        output: &mut [u8],
    ) -> CrypResult<()> {
        self.ensure_mapped()?;
        let (dma_in, dma_out) = self.dma_descriptors()?;
        if output.len() < input.len() {
            return Err(CrypError::DRIVER_CRYP_INVALID_SLICE);
        }

        let src = input.as_ptr() as usize;
        let dst = output.as_mut_ptr() as usize;
        if src % 4 != 0 {
            return Err(CrypError::DRIVER_CRYP_DMA_UNALIGNED_SOURCE);
        }
        if dst % 4 != 0 {
            return Err(CrypError::DRIVER_CRYP_DMA_UNALIGNED_DEST);
        }

        self.enable();
        self.enable_dma();

        let fields = DmaReconf::BUFFER_IN | DmaReconf::BUFFER_OUT | DmaReconf::SIZE;

        let mut in_req = dma::input_stream(self.din_addr(), None);
        in_req.src = src;
        in_req.size = input.len();
        port.reconfigure(dma_in, &in_req, fields)?;

        let mut out_req = dma::output_stream(self.dout_addr(), None);
        out_req.dst = dst;
        out_req.size = input.len();
        port.reconfigure(dma_out, &out_req, fields)?;

        Ok(())
    }

    fn dma_descriptors(&self) -> CrypResult<(DmaDescriptor, DmaDescriptor)> {
        match (self.dma_in, self.dma_out) {
            (Some(dma_in), Some(dma_out)) => Ok((dma_in, dma_out)),
            _ => Err(CrypError::DRIVER_CRYP_DMA_NOT_INITIALIZED),
        }
    }

    fn ensure_mapped(&self) -> CrypResult<()> {
        if self.device.is_mapped() {
            Ok(())
        } else {
            Err(CrypError::DRIVER_CRYP_DEVICE_NOT_MAPPED)
        }
    }

    fn din_addr(&self) -> usize {
        self.base + DIN_OFFSET
    }

    fn dout_addr(&self) -> usize {
        self.base + DOUT_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::{DmaDirection, DmaStatus};
    use crate::emu::{self, CrypModel, MockDevicePort, MockDmaPort, EMU_BASE};
    use std::cell::RefCell;

    struct NoteHandler;

    impl DmaHandler for NoteHandler {
        fn on_complete(&self, _status: DmaStatus) {}
    }

    static IN_DONE: NoteHandler = NoteHandler;
    static OUT_DONE: NoteHandler = NoteHandler;

    #[repr(align(4))]
    struct Aligned<const N: usize>([u8; N]);

    fn mapped_cryp(model: &RefCell<CrypModel>, usage: Usage) -> Cryp<emu::EmuMmio<'_>> {
        let mut cryp = emu::new_cryp(model, usage, ProvisioningMode::Bench);
        let mut devices = MockDevicePort::new();
        cryp.early_init(&mut devices, None, MapMode::Auto).unwrap();
        cryp
    }

    fn be_words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_set_key_128_register_layout() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let key: [u8; 16] = core::array::from_fn(|i| i as u8);
        cryp.set_key(&key, KeySize::Bits128).unwrap();

        let w = be_words(&key);
        let model = model.borrow();
        // Pairs 0 and 1 stay untouched for a 128-bit key.
        assert_eq!(model.key[0..4], [0, 0, 0, 0]);
        assert_eq!(model.key[4..8], [w[0], w[1], w[2], w[3]]);
        assert_eq!((model.cr >> 8) & 3, 0);
    }

    #[test]
    fn test_set_key_192_register_layout() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let key: [u8; 24] = core::array::from_fn(|i| (0x40 + i) as u8);
        cryp.set_key(&key, KeySize::Bits192).unwrap();

        let w = be_words(&key);
        let model = model.borrow();
        assert_eq!(model.key[0..2], [0, 0]);
        assert_eq!(model.key[2..8], w[..]);
        assert_eq!((model.cr >> 8) & 3, 1);
    }

    #[test]
    fn test_set_key_256_round_trips_through_registers() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let key: [u8; 32] = core::array::from_fn(|i| (0xc0 + i) as u8);
        cryp.set_key(&key, KeySize::Bits256).unwrap();

        let model = model.borrow();
        assert_eq!(model.key[..], be_words(&key)[..]);
        assert_eq!((model.cr >> 8) & 3, 2);

        // Register read-back reproduces the original byte order.
        let back: [u8; 32] = Array4x8::from(model.key).into();
        assert_eq!(back, key);
    }

    #[test]
    fn test_set_key_rejects_short_buffer() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let key = [0u8; 16];
        assert_eq!(
            cryp.set_key(&key, KeySize::Bits256),
            Err(CrypError::DRIVER_CRYP_INVALID_KEY_SIZE)
        );
        assert_eq!(model.borrow().key, [0; 8]);
    }

    #[test]
    fn test_set_key_rejected_outside_configurator_domain() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::User);

        let key = [0u8; 16];
        assert_eq!(
            cryp.set_key(&key, KeySize::Bits128),
            Err(CrypError::DRIVER_CRYP_KEY_NOT_PERMITTED)
        );
    }

    #[test]
    fn test_configure_key_precondition_has_no_partial_effect() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::User);
        model.borrow_mut().cr = 1 << 15;
        model.borrow_mut().iv = [0x77; 4];

        let key = [0u8; 16];
        let iv = [0u8; 16];
        assert_eq!(
            cryp.configure(
                Some(&key),
                KeySize::Bits128,
                Some(&iv),
                Algo::AesCbc,
                Direction::Encrypt
            ),
            Err(CrypError::DRIVER_CRYP_KEY_NOT_PERMITTED)
        );
        // Rejected before the engine was disabled or the IV overwritten.
        assert_eq!(model.borrow().cr, 1 << 15);
        assert_eq!(model.borrow().iv, [0x77; 4]);
    }

    #[test]
    fn test_set_key_empty_is_a_no_op() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);
        cryp.set_key(&[], KeySize::Bits256).unwrap();
        assert_eq!(model.borrow().key, [0; 8]);
    }

    #[test]
    fn test_iv_round_trip_16_bytes() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let iv: [u8; 16] = core::array::from_fn(|i| (0x10 + i) as u8);
        cryp.set_iv(&iv);
        assert_eq!(model.borrow().iv[..], be_words(&iv)[..]);

        let mut back = [0u8; 16];
        cryp.get_iv(&mut back);
        assert_eq!(back, iv);
    }

    #[test]
    fn test_iv_round_trip_8_bytes() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let iv = [9u8, 8, 7, 6, 5, 4, 3, 2];
        cryp.set_iv(&iv);
        assert_eq!(model.borrow().iv[0..2], be_words(&iv)[..]);
        assert_eq!(model.borrow().iv[2..4], [0, 0]);

        let mut back = [0u8; 8];
        cryp.get_iv(&mut back);
        assert_eq!(back, iv);
    }

    #[test]
    fn test_iv_invalid_length_leaves_registers_unmodified() {
        let model = RefCell::new(CrypModel::new());
        model.borrow_mut().iv = [0x11, 0x22, 0x33, 0x44];
        let mut cryp = mapped_cryp(&model, Usage::Config);

        cryp.set_iv(&[0u8; 12]);
        assert_eq!(model.borrow().iv, [0x11, 0x22, 0x33, 0x44]);

        let mut out = [0xffu8; 12];
        cryp.get_iv(&mut out);
        assert_eq!(out, [0xffu8; 12]);
    }

    #[test]
    fn test_configure_decrypt_runs_one_key_preparation_pass() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let key = [0u8; 16];
        let iv = [0u8; 16];
        cryp.configure(
            Some(&key),
            KeySize::Bits128,
            Some(&iv),
            Algo::AesCbc,
            Direction::Decrypt,
        )
        .unwrap();

        let model = model.borrow();
        assert_eq!(model.key_prepare_runs, 1);
        assert_eq!(model.busy_violations, 0);
        assert_eq!((model.cr >> 3) & 7, Algo::AesCbc as u32);
        assert_ne!(model.cr & (1 << 15), 0);
    }

    #[test]
    fn test_configure_encrypt_never_prepares_key() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let key = [0u8; 32];
        let iv = [0u8; 16];
        cryp.configure(
            Some(&key),
            KeySize::Bits256,
            Some(&iv),
            Algo::AesCbc,
            Direction::Encrypt,
        )
        .unwrap();
        assert_eq!(model.borrow().key_prepare_runs, 0);
    }

    #[test]
    fn test_configure_ctr_decrypt_never_prepares_key() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let key = [0u8; 16];
        let iv = [0u8; 16];
        cryp.configure(
            Some(&key),
            KeySize::Bits128,
            Some(&iv),
            Algo::AesCtr,
            Direction::Decrypt,
        )
        .unwrap();
        assert_eq!(model.borrow().key_prepare_runs, 0);
    }

    #[test]
    fn test_configure_without_key_never_prepares_key() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        cryp.configure(
            None,
            KeySize::Bits128,
            None,
            Algo::AesCbc,
            Direction::Decrypt,
        )
        .unwrap();
        assert_eq!(model.borrow().key_prepare_runs, 0);
    }

    #[test]
    fn test_configure_requires_mapped_window() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = emu::new_cryp(&model, Usage::Config, ProvisioningMode::Prod);
        assert_eq!(
            cryp.configure(
                None,
                KeySize::Bits128,
                None,
                Algo::AesEcb,
                Direction::Encrypt
            ),
            Err(CrypError::DRIVER_CRYP_DEVICE_NOT_MAPPED)
        );
    }

    #[test]
    fn test_configure_flushes_stale_fifo_contents() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);
        model.borrow_mut().seed_stale_fifos();

        cryp.configure_user(None, Algo::AesEcb, Direction::Encrypt)
            .unwrap();
        assert_eq!(model.borrow().fifo_depths(), (0, 0));
    }

    #[test]
    fn test_direction_changed() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        cryp.configure_user(None, Algo::AesEcb, Direction::Encrypt)
            .unwrap();
        assert!(!cryp.direction_changed(Direction::Encrypt));
        assert!(cryp.direction_changed(Direction::Decrypt));

        cryp.configure_user(None, Algo::AesEcb, Direction::Decrypt)
            .unwrap();
        assert!(!cryp.direction_changed(Direction::Decrypt));
        assert!(cryp.direction_changed(Direction::Encrypt));
    }

    #[test]
    fn test_fifo_round_batching() {
        for (len, expected) in [
            (16usize, vec![(4usize, 4usize)]),
            (32, vec![(8, 8)]),
            (48, vec![(8, 8), (4, 4)]),
        ] {
            let model = RefCell::new(CrypModel::new());
            let mut cryp = mapped_cryp(&model, Usage::Config);

            let input = vec![0xabu8; len];
            let mut output = vec![0u8; len];
            cryp.transfer_blocking(&input, &mut output).unwrap();
            assert_eq!(model.borrow_mut().rounds(), expected, "length {len}");
        }
    }

    #[test]
    fn test_transfer_blocking_applies_engine_transform() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let key = [1u8; 16];
        let iv = [2u8; 16];
        cryp.configure(
            Some(&key),
            KeySize::Bits128,
            Some(&iv),
            Algo::AesCbc,
            Direction::Encrypt,
        )
        .unwrap();

        let input: Vec<u8> = (0u8..48).collect();
        let mut output = vec![0u8; 48];
        cryp.transfer_blocking(&input, &mut output).unwrap();

        for (inw, outw) in input.chunks_exact(4).zip(output.chunks_exact(4)) {
            let inw = u32::from_le_bytes(inw.try_into().unwrap());
            let outw = u32::from_le_bytes(outw.try_into().unwrap());
            assert_eq!(outw, !inw);
        }
    }

    #[test]
    fn test_transfer_blocking_leaves_partial_block_untouched() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let input = vec![0x55u8; 20];
        let mut output = vec![0u8; 20];
        cryp.transfer_blocking(&input, &mut output).unwrap();

        assert!(output[..16].iter().all(|&b| b == 0xaa));
        assert!(output[16..].iter().all(|&b| b == 0));
        assert_eq!(model.borrow_mut().rounds(), vec![(4, 4)]);
    }

    #[test]
    fn test_transfer_blocking_rejects_short_output() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let input = [0u8; 32];
        let mut output = [0u8; 16];
        assert_eq!(
            cryp.transfer_blocking(&input, &mut output),
            Err(CrypError::DRIVER_CRYP_INVALID_SLICE)
        );
    }

    #[test]
    fn test_early_init_window_size_per_privilege_domain() {
        for (usage, size) in [(Usage::User, 0x100), (Usage::Config, 0x1000)] {
            let model = RefCell::new(CrypModel::new());
            let mut cryp = emu::new_cryp(&model, usage, ProvisioningMode::Prod);
            let mut devices = MockDevicePort::new();
            cryp.early_init(&mut devices, None, MapMode::Auto).unwrap();
            assert_eq!(devices.request_calls, 1);
            assert_eq!(devices.last_spec_size, size);
            assert_eq!(devices.map_calls, 1);
            assert!(cryp.is_mapped());
        }
    }

    #[test]
    fn test_voluntary_map_defers_to_caller() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = emu::new_cryp(&model, Usage::User, ProvisioningMode::Prod);
        let mut devices = MockDevicePort::new();
        cryp.early_init(&mut devices, None, MapMode::Voluntary)
            .unwrap();
        assert!(!cryp.is_mapped());
        assert_eq!(devices.map_calls, 0);

        cryp.map(&mut devices).unwrap();
        cryp.map(&mut devices).unwrap();
        assert!(cryp.is_mapped());
        assert_eq!(devices.map_calls, 1);

        cryp.unmap(&mut devices).unwrap();
        cryp.unmap(&mut devices).unwrap();
        assert!(!cryp.is_mapped());
        assert_eq!(devices.unmap_calls, 1);
    }

    #[test]
    fn test_early_init_propagates_platform_denial() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = emu::new_cryp(&model, Usage::User, ProvisioningMode::Prod);
        let mut devices = MockDevicePort::new();
        devices.deny = true;
        assert_eq!(
            cryp.early_init(&mut devices, None, MapMode::Auto),
            Err(CrypError::DRIVER_CRYP_DEVICE_ACCESS_DENIED)
        );
        assert!(!cryp.is_mapped());
    }

    #[test]
    fn test_early_init_propagates_dma_registration_failure() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = emu::new_cryp(&model, Usage::Config, ProvisioningMode::Bench);
        let mut devices = MockDevicePort::new();
        let mut dma = MockDmaPort::new();
        dma.deny = true;
        assert_eq!(
            cryp.early_init(&mut devices, Some(&mut dma), MapMode::Auto),
            Err(CrypError::DRIVER_CRYP_DMA_REJECTED)
        );

        let input = Aligned([0u8; 16]);
        let mut output = Aligned([0u8; 16]);
        assert_eq!(
            cryp.transfer_async(&mut dma, &input.0, &mut output.0),
            Err(CrypError::DRIVER_CRYP_DMA_NOT_INITIALIZED)
        );
    }

    #[test]
    fn test_early_init_registers_dma_stream_templates() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = emu::new_cryp(&model, Usage::Config, ProvisioningMode::Bench);
        let mut devices = MockDevicePort::new();
        let mut dma = MockDmaPort::new();
        cryp.early_init(&mut devices, Some(&mut dma), MapMode::Auto)
            .unwrap();

        assert_eq!(dma.registered.len(), 2);
        let input = &dma.registered[0];
        assert_eq!(input.direction, DmaDirection::MemoryToPeripheral);
        assert_eq!(input.dst, EMU_BASE + 0x08);
        assert_eq!(input.src, 0);
        assert_eq!(input.size, 0);
        assert!(!input.has_handler);
        let output = &dma.registered[1];
        assert_eq!(output.direction, DmaDirection::PeripheralToMemory);
        assert_eq!(output.src, EMU_BASE + 0x0c);
        assert_eq!(output.dst, 0);
    }

    #[test]
    fn test_init_dma_patches_handlers_and_enables_dma() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = emu::new_cryp(&model, Usage::Config, ProvisioningMode::Bench);
        let mut devices = MockDevicePort::new();
        let mut dma = MockDmaPort::new();
        cryp.early_init(&mut devices, Some(&mut dma), MapMode::Auto)
            .unwrap();

        cryp.init_dma(&mut dma, &IN_DONE, &OUT_DONE).unwrap();

        assert_eq!(dma.reconfigs.len(), 2);
        for reconf in &dma.reconfigs {
            assert_eq!(
                reconf.fields,
                DmaReconf::HANDLERS | DmaReconf::MODE | DmaReconf::PRIORITY
            );
            assert!(reconf.request.has_handler);
        }
        assert_eq!(model.borrow().dmacr, 0b11);
    }

    #[test]
    fn test_transfer_async_patches_buffers_into_descriptors() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = emu::new_cryp(&model, Usage::Config, ProvisioningMode::Bench);
        let mut devices = MockDevicePort::new();
        let mut dma = MockDmaPort::new();
        cryp.early_init(&mut devices, Some(&mut dma), MapMode::Auto)
            .unwrap();
        cryp.init_dma(&mut dma, &IN_DONE, &OUT_DONE).unwrap();
        dma.reconfigs.clear();

        let input = Aligned([0x5au8; 32]);
        let mut output = Aligned([0u8; 32]);
        cryp.transfer_async(&mut dma, &input.0, &mut output.0)
            .unwrap();

        assert_eq!(dma.reconfigs.len(), 2);
        let fields = DmaReconf::BUFFER_IN | DmaReconf::BUFFER_OUT | DmaReconf::SIZE;
        let in_reconf = &dma.reconfigs[0];
        assert_eq!(in_reconf.fields, fields);
        assert_eq!(in_reconf.request.src, input.0.as_ptr() as usize);
        assert_eq!(in_reconf.request.dst, EMU_BASE + 0x08);
        assert_eq!(in_reconf.request.size, 32);
        let out_reconf = &dma.reconfigs[1];
        assert_eq!(out_reconf.fields, fields);
        assert_eq!(out_reconf.request.dst, output.0.as_ptr() as usize);
        assert_eq!(out_reconf.request.size, 32);

        // Engine and DMA enables precede descriptor submission.
        let model = model.borrow();
        assert_ne!(model.cr & (1 << 15), 0);
        assert_eq!(model.dmacr, 0b11);
    }

    #[test]
    fn test_transfer_async_rejects_misaligned_buffers() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = emu::new_cryp(&model, Usage::Config, ProvisioningMode::Bench);
        let mut devices = MockDevicePort::new();
        let mut dma = MockDmaPort::new();
        cryp.early_init(&mut devices, Some(&mut dma), MapMode::Auto)
            .unwrap();
        cryp.init_dma(&mut dma, &IN_DONE, &OUT_DONE).unwrap();
        dma.reconfigs.clear();

        let input = Aligned([0u8; 32]);
        let mut output = Aligned([0u8; 32]);

        assert_eq!(
            cryp.transfer_async(&mut dma, &input.0[1..17], &mut output.0[..16]),
            Err(CrypError::DRIVER_CRYP_DMA_UNALIGNED_SOURCE)
        );
        assert_eq!(
            cryp.transfer_async(&mut dma, &input.0[..16], &mut output.0[1..17]),
            Err(CrypError::DRIVER_CRYP_DMA_UNALIGNED_DEST)
        );
        assert!(dma.reconfigs.is_empty());
    }

    #[test]
    fn test_transfer_async_requires_registered_streams() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);
        let mut dma = MockDmaPort::new();

        let input = Aligned([0u8; 16]);
        let mut output = Aligned([0u8; 16]);
        assert_eq!(
            cryp.transfer_async(&mut dma, &input.0, &mut output.0),
            Err(CrypError::DRIVER_CRYP_DMA_NOT_INITIALIZED)
        );
    }

    #[test]
    fn test_configure_injector_then_user_flow() {
        let model = RefCell::new(CrypModel::new());
        let mut cryp = mapped_cryp(&model, Usage::Config);

        let key: [u8; 32] = core::array::from_fn(|i| i as u8);
        cryp.configure_injector(Some(&key), KeySize::Bits256).unwrap();
        assert_eq!(model.borrow().key[..], be_words(&key)[..]);

        let iv = [3u8; 16];
        cryp.configure_user(Some(&iv), Algo::AesCtr, Direction::Encrypt)
            .unwrap();
        let mut back = [0u8; 16];
        cryp.get_iv(&mut back);
        assert_eq!(back, iv);
        assert_eq!(model.borrow().busy_violations, 0);
    }
}
