// raleighsl: format v1
// Declares which semantic/space/key plugins a store uses; the store open
// path resolves the three UUIDs through the registry and refuses unknowns.

use crate::plugins::{FormatPlugin, PlugInfo, PlugKind};
use uuid::Uuid;

pub const FORMAT_V1_UUID: Uuid = Uuid::from_bytes([
    0x42, 0x7d, 0x99, 0x1c, 0x63, 0x0f, 0x4b, 0xd0, 0x81, 0x40, 0x2e, 0x6b, 0x97, 0xce, 0x08,
    0x5a,
]);

pub struct FormatV1 {
    info: PlugInfo,
    semantic: Uuid,
    space: Uuid,
    key: Uuid,
}

impl FormatV1 {
    pub fn new(semantic: Uuid, space: Uuid, key: Uuid) -> Self {
        Self {
            info: PlugInfo {
                uuid: FORMAT_V1_UUID,
                label: "format-v1",
                description: "Format v1",
                kind: PlugKind::Format,
            },
            semantic,
            space,
            key,
        }
    }
}

impl FormatPlugin for FormatV1 {
    fn info(&self) -> &PlugInfo {
        &self.info
    }

    fn semantic_uuid(&self) -> Uuid {
        self.semantic
    }

    fn space_uuid(&self) -> Uuid {
        self.space
    }

    fn key_uuid(&self) -> Uuid {
        self.key
    }
}
