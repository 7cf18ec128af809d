//! Device context: the four standard Modbus data blocks plus file
//! records, bundled the way a single slave's address space is.

use super::block::{Block, BlockResult};
use super::file_records::FileRecordStore;
use crate::pdu::ExceptionCode;

/// One addressable device's data blocks.
///
/// Blocks are boxed trait objects so a device can mix sequential and
/// sparse blocks per register type, matching pymodbus's per-block
/// flexibility (a device can back `hr` with a sparse map while `co`
/// stays a flat sequential run).
pub struct DeviceContext {
    pub discrete_inputs: Box<dyn Block<bool> + Send + Sync>,
    pub coils: Box<dyn Block<bool> + Send + Sync>,
    pub holding_registers: Box<dyn Block<u16> + Send + Sync>,
    pub input_registers: Box<dyn Block<u16> + Send + Sync>,
    pub file_records: FileRecordStore,
    /// FC7 exception status byte; a bit field applications may set to
    /// surface device-specific alarm bits. Not tied to any block.
    exception_status: u8,
    /// FC11/12 communication event counter, incremented once per
    /// successfully dispatched request (read or write).
    comm_event_count: u16,
    /// FC12 communication event log, most recent first, capped the way
    /// a real device's fixed-size ring buffer would be.
    comm_event_log: Vec<u8>,
}

const COMM_EVENT_LOG_CAP: usize = 64;

impl DeviceContext {
    pub fn new(
        discrete_inputs: Box<dyn Block<bool> + Send + Sync>,
        coils: Box<dyn Block<bool> + Send + Sync>,
        holding_registers: Box<dyn Block<u16> + Send + Sync>,
        input_registers: Box<dyn Block<u16> + Send + Sync>,
    ) -> Self {
        Self {
            discrete_inputs,
            coils,
            holding_registers,
            input_registers,
            file_records: FileRecordStore::new(),
            exception_status: 0,
            comm_event_count: 0,
            comm_event_log: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.discrete_inputs.reset();
        self.coils.reset();
        self.holding_registers.reset();
        self.input_registers.reset();
        self.exception_status = 0;
        self.comm_event_count = 0;
        self.comm_event_log.clear();
    }

    pub fn exception_status(&self) -> u8 {
        self.exception_status
    }

    pub fn set_exception_status(&mut self, status: u8) {
        self.exception_status = status;
    }

    pub fn comm_event_count(&self) -> u16 {
        self.comm_event_count
    }

    pub fn comm_event_log(&self) -> &[u8] {
        &self.comm_event_log
    }

    /// Records one dispatched transaction, as a real device's comm event
    /// counter/log would on every request it answers.
    pub fn record_comm_event(&mut self, event: u8) {
        self.comm_event_count = self.comm_event_count.wrapping_add(1);
        self.comm_event_log.insert(0, event);
        self.comm_event_log.truncate(COMM_EVENT_LOG_CAP);
    }

    pub fn read_coils(&self, address: u16, quantity: u16) -> BlockResult<Vec<bool>> {
        self.coils.get_values(address, quantity)
    }

    pub fn read_discrete_inputs(&self, address: u16, quantity: u16) -> BlockResult<Vec<bool>> {
        self.discrete_inputs.get_values(address, quantity)
    }

    pub fn read_holding_registers(&self, address: u16, quantity: u16) -> BlockResult<Vec<u16>> {
        self.holding_registers.get_values(address, quantity)
    }

    pub fn read_input_registers(&self, address: u16, quantity: u16) -> BlockResult<Vec<u16>> {
        self.input_registers.get_values(address, quantity)
    }

    pub fn write_coils(&mut self, address: u16, values: &[bool]) -> BlockResult<()> {
        self.coils.set_values(address, values)
    }

    pub fn write_holding_registers(&mut self, address: u16, values: &[u16]) -> BlockResult<()> {
        self.holding_registers.set_values(address, values)
    }

    pub fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> BlockResult<()> {
        let current = self.holding_registers.get_values(address, 1)?;
        let new_value = (current[0] & and_mask) | (or_mask & !and_mask);
        self.holding_registers.set_values(address, &[new_value])
    }

    pub fn read_fifo_queue(&self, address: u16) -> BlockResult<Vec<u16>> {
        // The FIFO pointer register holds the count, followed by up to 31
        // queued values at address+1.. (the standard FC24 layout).
        let count = self.holding_registers.get_values(address, 1)?[0];
        if count > 31 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        self.holding_registers.get_values(address + 1, count)
    }
}
