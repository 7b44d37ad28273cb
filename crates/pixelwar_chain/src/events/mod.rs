//! # Contract Events
//!
//! `PixelUpdated` log parsing. We parse straight from topic/data bytes
//! instead of going through a generic decoder; the layout is fixed:
//!
//! ```text
//! topics: [sig] [x] [y] [who]
//! data:   color(32) | timestamp(32)
//! ```

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolEvent;

use pixelwar_core::{Coord, Rgb, Timestamp};

use crate::contracts::IPixelBoard;

/// A pixel change reported by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelChange {
    /// Where.
    pub coord: Coord,
    /// New color.
    pub color: Rgb,
    /// Account that set it.
    pub who: Address,
    /// Block timestamp of the change.
    pub timestamp: Timestamp,
    /// Block number where this occurred.
    pub block_number: u64,
}

impl PixelChange {
    /// Encodes this change the way the contract would log it.
    #[must_use]
    pub fn to_log_parts(&self) -> (Vec<[u8; 32]>, Vec<u8>) {
        let mut who = [0u8; 32];
        who[12..].copy_from_slice(self.who.as_slice());

        let topics = vec![
            IPixelBoard::PixelUpdated::SIGNATURE_HASH.0,
            U256::from(self.coord.x).to_be_bytes::<32>(),
            U256::from(self.coord.y).to_be_bytes::<32>(),
            who,
        ];

        let mut data = vec![0u8; 64];
        data[28..32].copy_from_slice(&self.color.to_wire().to_be_bytes());
        data[32..64].copy_from_slice(&U256::from(self.timestamp.as_secs()).to_be_bytes::<32>());
        (topics, data)
    }
}

/// Event parser for raw log data.
pub struct EventParser;

impl EventParser {
    /// Parses a `PixelUpdated` log.
    ///
    /// # Returns
    ///
    /// `None` for foreign events, short payloads, or coordinates that do
    /// not fit a `u32`.
    #[must_use]
    pub fn parse_pixel_updated(
        topics: &[[u8; 32]],
        data: &[u8],
        block_number: u64,
    ) -> Option<PixelChange> {
        if topics.len() < 4 || data.len() < 64 {
            return None;
        }
        if topics[0] != IPixelBoard::PixelUpdated::SIGNATURE_HASH.0 {
            return None;
        }

        let x = u32::try_from(U256::from_be_slice(&topics[1])).ok()?;
        let y = u32::try_from(U256::from_be_slice(&topics[2])).ok()?;
        let who = Address::from_slice(&topics[3][12..32]);

        // Low 4 bytes of the first word; the top byte is masked off anyway.
        let wire = u32::from_be_bytes([data[28], data[29], data[30], data[31]]);
        let secs = u64::try_from(U256::from_be_slice(&data[32..64])).unwrap_or(u64::MAX);

        Some(PixelChange {
            coord: Coord::new(x, y),
            color: Rgb::from_wire(wire),
            who,
            timestamp: Timestamp::from_secs(secs),
            block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change() -> PixelChange {
        PixelChange {
            coord: Coord::new(4, 9),
            color: Rgb::new(0x12, 0x34, 0x56),
            who: Address::repeat_byte(0x11),
            timestamp: Timestamp::from_secs(1_700_000_123),
            block_number: 77,
        }
    }

    #[test]
    fn test_parse_encoded_change() {
        let (topics, data) = change().to_log_parts();
        let parsed = EventParser::parse_pixel_updated(&topics, &data, 77).unwrap();
        assert_eq!(parsed, change());
    }

    #[test]
    fn test_foreign_signature_ignored() {
        let (mut topics, data) = change().to_log_parts();
        topics[0] = [0u8; 32];
        assert!(EventParser::parse_pixel_updated(&topics, &data, 1).is_none());
    }

    #[test]
    fn test_short_payload_ignored() {
        let (topics, data) = change().to_log_parts();
        assert!(EventParser::parse_pixel_updated(&topics[..3], &data, 1).is_none());
        assert!(EventParser::parse_pixel_updated(&topics, &data[..40], 1).is_none());
    }

    #[test]
    fn test_high_color_bits_masked() {
        let (topics, mut data) = change().to_log_parts();
        data[28] = 0xEE;
        let parsed = EventParser::parse_pixel_updated(&topics, &data, 1).unwrap();
        assert_eq!(parsed.color, Rgb::new(0x12, 0x34, 0x56));
    }

    #[test]
    fn test_oversized_coordinate_rejected() {
        let (mut topics, data) = change().to_log_parts();
        topics[1] = [0xFF; 32];
        assert!(EventParser::parse_pixel_updated(&topics, &data, 1).is_none());
    }
}
