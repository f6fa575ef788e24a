/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Typed access to 32-bit memory-mapped peripheral registers.

--*/

#![cfg_attr(not(test), no_std)]

use core::marker::PhantomData;

/// Raw storage width of every register reachable through this crate. The
/// peripherals this project drives expose a uniform 32-bit bus.
pub type RawVal = u32;

/// Backend for volatile register access.
///
/// `RealMmio`/`RealMmioMut` forward to volatile pointer operations; test
/// harnesses substitute an emulated bus that interprets the same addresses.
pub trait Mmio {
    /// # Safety
    ///
    /// `src` must be valid for a volatile 32-bit read, or the implementation
    /// must interpret the address without dereferencing it.
    unsafe fn read_volatile(&self, src: *const RawVal) -> RawVal;
}

pub trait MmioMut: Mmio {
    /// # Safety
    ///
    /// `dst` must be valid for a volatile 32-bit write, or the implementation
    /// must interpret the address without dereferencing it.
    unsafe fn write_volatile(&self, dst: *mut RawVal, val: RawVal);
}

impl<M: Mmio + ?Sized> Mmio for &M {
    unsafe fn read_volatile(&self, src: *const RawVal) -> RawVal {
        (**self).read_volatile(src)
    }
}

impl<M: MmioMut + ?Sized> MmioMut for &M {
    unsafe fn write_volatile(&self, dst: *mut RawVal, val: RawVal) {
        (**self).write_volatile(dst, val)
    }
}

/// Read-only access to the real register bus.
#[derive(Clone, Copy, Default)]
pub struct RealMmio;

impl Mmio for RealMmio {
    unsafe fn read_volatile(&self, src: *const RawVal) -> RawVal {
        core::ptr::read_volatile(src)
    }
}

/// Read-write access to the real register bus.
#[derive(Clone, Copy, Default)]
pub struct RealMmioMut;

impl Mmio for RealMmioMut {
    unsafe fn read_volatile(&self, src: *const RawVal) -> RawVal {
        core::ptr::read_volatile(src)
    }
}

impl MmioMut for RealMmioMut {
    unsafe fn write_volatile(&self, dst: *mut RawVal, val: RawVal) {
        core::ptr::write_volatile(dst, val)
    }
}

/// Marker for a register meta-type.
pub trait RegType {}

pub trait ReadableReg: RegType {
    type ReadVal: From<RawVal>;
}

pub trait WritableReg: RegType {
    type WriteVal: From<RawVal> + Into<RawVal>;
}

pub trait ResettableReg: RegType {
    const RESET_VAL: RawVal;
}

/// A reference to a single register, bound to an access backend.
pub struct RegRef<TReg: RegType, TMmio: Mmio> {
    ptr: *mut RawVal,
    mmio: TMmio,
    _reg: PhantomData<TReg>,
}

impl<TReg: RegType, TMmio: Mmio> RegRef<TReg, TMmio> {
    /// # Safety
    ///
    /// `ptr` must be an address the `mmio` backend can service.
    pub unsafe fn new_with_mmio(ptr: *mut RawVal, mmio: TMmio) -> Self {
        Self {
            ptr,
            mmio,
            _reg: PhantomData,
        }
    }

    #[inline(always)]
    pub fn read(&self) -> TReg::ReadVal
    where
        TReg: ReadableReg,
    {
        TReg::ReadVal::from(unsafe { self.mmio.read_volatile(self.ptr) })
    }
}

impl<TReg: RegType, TMmio: MmioMut> RegRef<TReg, TMmio> {
    /// Write the register, starting from its reset value.
    #[inline(always)]
    pub fn write(&self, f: impl FnOnce(TReg::WriteVal) -> TReg::WriteVal)
    where
        TReg: WritableReg + ResettableReg,
    {
        let val = f(TReg::WriteVal::from(TReg::RESET_VAL));
        unsafe { self.mmio.write_volatile(self.ptr, val.into()) }
    }

    /// Read-modify-write; untouched fields keep their current contents.
    #[inline(always)]
    pub fn modify(&self, f: impl FnOnce(TReg::WriteVal) -> TReg::WriteVal)
    where
        TReg: ReadableReg + WritableReg,
    {
        let current = unsafe { self.mmio.read_volatile(self.ptr) };
        let val = f(TReg::WriteVal::from(current));
        unsafe { self.mmio.write_volatile(self.ptr, val.into()) }
    }
}

/// Meta-type for a read-only 32-bit register.
pub struct ReadOnlyReg32<TReadVal> {
    _phantom: PhantomData<TReadVal>,
}

impl<TReadVal> RegType for ReadOnlyReg32<TReadVal> {}

impl<TReadVal: From<RawVal>> ReadableReg for ReadOnlyReg32<TReadVal> {
    type ReadVal = TReadVal;
}

/// Meta-type for a write-only 32-bit register.
pub struct WriteOnlyReg32<const RESET: u32, TWriteVal> {
    _phantom: PhantomData<TWriteVal>,
}

impl<const RESET: u32, TWriteVal> RegType for WriteOnlyReg32<RESET, TWriteVal> {}

impl<const RESET: u32, TWriteVal: From<RawVal> + Into<RawVal>> WritableReg
    for WriteOnlyReg32<RESET, TWriteVal>
{
    type WriteVal = TWriteVal;
}

impl<const RESET: u32, TWriteVal: From<RawVal> + Into<RawVal>> ResettableReg
    for WriteOnlyReg32<RESET, TWriteVal>
{
    const RESET_VAL: RawVal = RESET;
}

/// Meta-type for a read-write 32-bit register.
pub struct ReadWriteReg32<const RESET: u32, TReadVal, TWriteVal> {
    _phantom: PhantomData<(TReadVal, TWriteVal)>,
}

impl<const RESET: u32, TReadVal, TWriteVal> RegType
    for ReadWriteReg32<RESET, TReadVal, TWriteVal>
{
}

impl<const RESET: u32, TReadVal: From<RawVal>, TWriteVal> ReadableReg
    for ReadWriteReg32<RESET, TReadVal, TWriteVal>
{
    type ReadVal = TReadVal;
}

impl<const RESET: u32, TReadVal, TWriteVal: From<RawVal> + Into<RawVal>> WritableReg
    for ReadWriteReg32<RESET, TReadVal, TWriteVal>
{
    type WriteVal = TWriteVal;
}

impl<const RESET: u32, TReadVal, TWriteVal: From<RawVal> + Into<RawVal>> ResettableReg
    for ReadWriteReg32<RESET, TReadVal, TWriteVal>
{
    const RESET_VAL: RawVal = RESET;
}
