// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Flow windows: the configured byte range of a packet used as hash
//! input.

use super::packet::Packet;
use alloc::string::ToString;
use manifold_api::FlowWindow;
use manifold_api::ModuleError;

/// Longest window a policy may hash over.
pub const MAX_WINDOW: usize = 32;

/// The window bytes of `pkt`, or `None` when the packet is too short
/// to contain the window. A short packet is malformed for the
/// configured pipeline and is handled per packet, never by aborting
/// the batch.
pub fn window<'a>(pkt: &'a Packet, w: &FlowWindow) -> Option<&'a [u8]> {
    let start = w.offset as usize;
    let end = start.checked_add(w.length as usize)?;
    pkt.data().get(start..end)
}

/// Construction-time validation of a window descriptor.
pub fn validate(w: &FlowWindow) -> Result<(), ModuleError> {
    if w.length == 0 || w.length as usize > MAX_WINDOW {
        return Err(ModuleError::InvalidArgument {
            field: "window.length".to_string(),
            msg: format!("must be 1..={}, got {}", MAX_WINDOW, w.length),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::packet::PacketPool;

    #[test]
    fn window_bounds() {
        let mut pool = PacketPool::new(1, 64).unwrap();
        let mut pkt = pool.alloc().unwrap();
        for i in 0..20 {
            pkt.buf_mut()[i] = i as u8;
        }
        pkt.set_len(20);

        let w = FlowWindow { offset: 12, length: 4 };
        assert_eq!(window(&pkt, &w), Some(&[12u8, 13, 14, 15][..]));

        // Window past the live length: malformed, skip the packet.
        let w = FlowWindow { offset: 18, length: 4 };
        assert_eq!(window(&pkt, &w), None);
    }

    #[test]
    fn validate_length() {
        assert!(validate(&FlowWindow { offset: 0, length: 4 }).is_ok());
        assert!(validate(&FlowWindow { offset: 0, length: 0 }).is_err());
        assert!(
            validate(&FlowWindow { offset: 0, length: MAX_WINDOW as u16 + 1 })
                .is_err()
        );
    }
}
