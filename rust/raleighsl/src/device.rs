// raleighsl: in-memory device
// Byte-addressed storage behind the DevicePlugin seam; a fixed-capacity
// buffer that grows on write up to its capacity.

use crate::error::{StoreError, StoreResult};
use crate::plugins::{DevicePlugin, PlugInfo, PlugKind};
use parking_lot::RwLock;
use uuid::Uuid;

pub const MEM_DEVICE_UUID: Uuid = Uuid::from_bytes([
    0x08, 0xc1, 0x66, 0x3e, 0x24, 0xba, 0x47, 0x0a, 0xa6, 0xf2, 0x19, 0x84, 0x7d, 0x55, 0xc3,
    0x92,
]);

pub struct MemDevice {
    info: PlugInfo,
    capacity: u64,
    data: RwLock<Vec<u8>>,
}

impl MemDevice {
    pub fn new(capacity: u64) -> Self {
        Self {
            info: PlugInfo {
                uuid: MEM_DEVICE_UUID,
                label: "device-mem",
                description: "In-Memory Device",
                kind: PlugKind::Device,
            },
            capacity,
            data: RwLock::new(Vec::new()),
        }
    }
}

impl DevicePlugin for MemDevice {
    fn info(&self) -> &PlugInfo {
        &self.info
    }

    fn used(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn free(&self) -> u64 {
        self.capacity - self.used()
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> StoreResult<()> {
        let data = self.data.read();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(StoreError::Io(format!(
                "read past device end: {}..{} of {}",
                start,
                end,
                data.len()
            )));
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write(&self, offset: u64, payload: &[u8]) -> StoreResult<()> {
        let end = offset + payload.len() as u64;
        if end > self.capacity {
            return Err(StoreError::Io("write past device capacity".into()));
        }
        let mut data = self.data.write();
        if end as usize > data.len() {
            data.resize(end as usize, 0);
        }
        data[offset as usize..end as usize].copy_from_slice(payload);
        Ok(())
    }

    fn sync(&self) -> StoreResult<()> {
        Ok(())
    }
}
