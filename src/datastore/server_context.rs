//! Server context: maps device id to device context, in either
//! single-device or multi-device mode.

use std::collections::HashMap;

use super::device::DeviceContext;

/// Either a single device context that answers every device id, or a
/// table keyed by device id. Device id `0` is reserved for broadcast and
/// is never a key in [`ServerContext::Multi`].
pub enum ServerContext {
    Single(DeviceContext),
    Multi(HashMap<u8, DeviceContext>),
}

impl ServerContext {
    pub fn device(&self, device_id: u8) -> Option<&DeviceContext> {
        match self {
            Self::Single(ctx) => Some(ctx),
            Self::Multi(map) => map.get(&device_id),
        }
    }

    pub fn device_mut(&mut self, device_id: u8) -> Option<&mut DeviceContext> {
        match self {
            Self::Single(ctx) => Some(ctx),
            Self::Multi(map) => map.get_mut(&device_id),
        }
    }

    /// Every device id this context can answer, for broadcast dispatch in
    /// multi mode. Single mode broadcasts to its one context.
    pub fn device_ids(&self) -> Vec<u8> {
        match self {
            Self::Single(_) => vec![0],
            Self::Multi(map) => map.keys().copied().collect(),
        }
    }

    pub fn for_each_device_mut(&mut self, mut f: impl FnMut(&mut DeviceContext)) {
        match self {
            Self::Single(ctx) => f(ctx),
            Self::Multi(map) => {
                for ctx in map.values_mut() {
                    f(ctx);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::block::{Block, SequentialBlock};

    fn empty_device() -> DeviceContext {
        DeviceContext::new(
            Box::new(SequentialBlock::new(0, vec![false; 10])),
            Box::new(SequentialBlock::new(0, vec![false; 10])),
            Box::new(SequentialBlock::new(0, vec![0u16; 10])),
            Box::new(SequentialBlock::new(0, vec![0u16; 10])),
        )
    }

    #[test]
    fn single_mode_answers_any_device_id() {
        let ctx = ServerContext::Single(empty_device());
        assert!(ctx.device(1).is_some());
        assert!(ctx.device(200).is_some());
    }

    #[test]
    fn multi_mode_answers_only_known_ids() {
        let mut map = HashMap::new();
        map.insert(1u8, empty_device());
        let ctx = ServerContext::Multi(map);
        assert!(ctx.device(1).is_some());
        assert!(ctx.device(2).is_none());
    }
}
