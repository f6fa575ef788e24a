/*++

Licensed under the Apache-2.0 license.

File Name:

    dma.rs

Abstract:

    Descriptor model for the external DMA engine that streams data through
    the CRYP FIFO registers. The driver owns two unidirectional stream
    templates registered once at startup; per-transfer calls only patch
    buffer addresses and size into them.

--*/

use crate::CrypResult;

use bitflags::bitflags;

/// DMA controller servicing the CRYP data registers.
pub const CRYP_DMA_CONTROLLER: u8 = 2;
/// Stream feeding the input FIFO.
pub const CRYP_DMA_STREAM_IN: u8 = 6;
/// Stream draining the output FIFO.
pub const CRYP_DMA_STREAM_OUT: u8 = 5;
/// Request channel for both streams.
pub const CRYP_DMA_CHANNEL: u8 = 2;

bitflags! {
    /// Fields a `DmaPort::reconfigure` call patches into a registered
    /// stream. Partial reconfiguration is first-class; anything not selected
    /// keeps its registered value.
    pub struct DmaReconf: u32 {
        const BUFFER_IN = 1 << 0;
        const BUFFER_OUT = 1 << 1;
        const SIZE = 1 << 2;
        const HANDLERS = 1 << 3;
        const MODE = 1 << 4;
        const PRIORITY = 1 << 5;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DmaDirection {
    MemoryToPeripheral,
    PeripheralToMemory,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DmaPriority {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DmaBurst {
    Single,
    Incr4,
    Incr8,
    Incr16,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DmaMode {
    Direct,
    Fifo,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DmaDataSize {
    Byte,
    HalfWord,
    Word,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DmaFlowControl {
    Dma,
    Peripheral,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DmaStatus {
    Complete,
    TransferError,
}

/// Completion capability handed to the external DMA engine. `on_complete` is
/// invoked from the engine's own execution context, outside this driver's
/// call stack; input and output completions arrive in either order.
pub trait DmaHandler: Sync {
    fn on_complete(&self, status: DmaStatus);
}

/// One unidirectional stream configuration, handed to the external engine by
/// reference. Addresses must respect the engine's word granularity.
#[derive(Clone, Copy)]
pub struct DmaRequest {
    pub controller: u8,
    pub stream: u8,
    pub channel: u8,
    pub direction: DmaDirection,
    pub src: usize,
    pub dst: usize,
    pub size: usize,
    pub priority: DmaPriority,
    pub mode: DmaMode,
    pub data_size: DmaDataSize,
    pub mem_burst: DmaBurst,
    pub dev_burst: DmaBurst,
    pub mem_inc: bool,
    pub dev_inc: bool,
    pub flow_control: DmaFlowControl,
    pub handler: Option<&'static dyn DmaHandler>,
}

/// Opaque handle identifying a stream registered with the external engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DmaDescriptor(u32);

impl DmaDescriptor {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// External DMA engine interface. Registration allocates a descriptor and is
/// expensive; `reconfigure` patches an existing descriptor and is the
/// per-transfer path.
pub trait DmaPort {
    fn register_stream(&mut self, request: &DmaRequest) -> CrypResult<DmaDescriptor>;
    fn reconfigure(
        &mut self,
        descriptor: DmaDescriptor,
        request: &DmaRequest,
        fields: DmaReconf,
    ) -> CrypResult<()>;
}

/// Stream template for the memory-to-peripheral direction. Buffer address
/// and size stay zero until a transfer patches them in.
pub(crate) fn input_stream(din_addr: usize, handler: Option<&'static dyn DmaHandler>) -> DmaRequest {
    DmaRequest {
        controller: CRYP_DMA_CONTROLLER,
        stream: CRYP_DMA_STREAM_IN,
        channel: CRYP_DMA_CHANNEL,
        direction: DmaDirection::MemoryToPeripheral,
        src: 0,
        dst: din_addr,
        size: 0,
        priority: DmaPriority::Medium,
        mode: DmaMode::Direct,
        data_size: DmaDataSize::Word,
        mem_burst: DmaBurst::Incr4,
        dev_burst: DmaBurst::Incr4,
        mem_inc: true,
        dev_inc: false,
        flow_control: DmaFlowControl::Dma,
        handler,
    }
}

/// Stream template for the peripheral-to-memory direction.
pub(crate) fn output_stream(
    dout_addr: usize,
    handler: Option<&'static dyn DmaHandler>,
) -> DmaRequest {
    DmaRequest {
        controller: CRYP_DMA_CONTROLLER,
        stream: CRYP_DMA_STREAM_OUT,
        channel: CRYP_DMA_CHANNEL,
        direction: DmaDirection::PeripheralToMemory,
        src: dout_addr,
        dst: 0,
        size: 0,
        priority: DmaPriority::High,
        mode: DmaMode::Direct,
        data_size: DmaDataSize::Word,
        mem_burst: DmaBurst::Incr4,
        dev_burst: DmaBurst::Incr4,
        mem_inc: true,
        dev_inc: false,
        flow_control: DmaFlowControl::Dma,
        handler,
    }
}
