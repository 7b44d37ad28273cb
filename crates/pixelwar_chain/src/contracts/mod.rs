//! # Contract Definitions
//!
//! PixelBoard contract ABI and the calldata helpers built on it.

// The sol! macro generates code that we can't document, so allow missing_docs
#![allow(missing_docs)]

use alloy_primitives::U256;
use alloy_sol_types::{sol, SolCall};

use pixelwar_core::{Coord, Rgb, Timestamp};

sol! {
    /// The PixelBoard contract - a shared grid of 24-bit colors.
    ///
    /// Each account may set one pixel per cooldown window; the contract
    /// enforces it and reverts otherwise.
    #[derive(Debug)]
    interface IPixelBoard {
        /// Emitted when a pixel changes color.
        event PixelUpdated(
            uint256 indexed x,
            uint256 indexed y,
            uint32 color,
            address indexed who,
            uint256 timestamp
        );

        /// Reads one pixel and the time it last changed (0 if never).
        function getPixel(uint256 x, uint256 y) external view returns (
            uint32 color,
            uint256 lastChanged
        );

        /// Reads a full row of wire colors.
        function getRow(uint256 y) external view returns (uint32[] memory colors);

        /// Sets one pixel on behalf of the sender.
        function setPixel(uint256 x, uint256 y, uint32 color) external;
    }
}

/// Rust representation of one on-chain pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRead {
    /// Where it is.
    pub coord: Coord,
    /// Current color.
    pub color: Rgb,
    /// When it last changed, `None` if the contract reports 0.
    pub last_changed: Option<Timestamp>,
}

impl PixelRead {
    /// Builds the Rust view from raw `getPixel` output.
    #[must_use]
    pub fn from_chain_data(coord: Coord, wire: u32, last_changed: U256) -> Self {
        let secs = u64::try_from(last_changed).unwrap_or(u64::MAX);
        Self {
            coord,
            color: Rgb::from_wire(wire),
            last_changed: (secs != 0).then(|| Timestamp::from_secs(secs)),
        }
    }
}

/// Calldata for `getRow(y)`.
#[must_use]
pub fn get_row_calldata(y: u32) -> Vec<u8> {
    IPixelBoard::getRowCall { y: U256::from(y) }.abi_encode()
}

/// Decodes `getRow` return data into wire colors.
///
/// # Errors
///
/// ABI decoding errors.
pub fn decode_row(data: &[u8]) -> Result<Vec<u32>, alloy_sol_types::Error> {
    IPixelBoard::getRowCall::abi_decode_returns(data, true).map(|ret| ret.colors)
}

/// Calldata for `getPixel(x, y)`.
#[must_use]
pub fn get_pixel_calldata(coord: Coord) -> Vec<u8> {
    IPixelBoard::getPixelCall {
        x: U256::from(coord.x),
        y: U256::from(coord.y),
    }
    .abi_encode()
}

/// Decodes `getPixel` return data.
///
/// # Errors
///
/// ABI decoding errors.
pub fn decode_pixel(coord: Coord, data: &[u8]) -> Result<PixelRead, alloy_sol_types::Error> {
    IPixelBoard::getPixelCall::abi_decode_returns(data, true)
        .map(|ret| PixelRead::from_chain_data(coord, ret.color, ret.lastChanged))
}

/// Calldata for `setPixel(x, y, color)`. The top byte of the color is
/// always zero.
#[must_use]
pub fn set_pixel_calldata(coord: Coord, color: Rgb) -> Vec<u8> {
    IPixelBoard::setPixelCall {
        x: U256::from(coord.x),
        y: U256::from(coord.y),
        color: color.to_wire(),
    }
    .abi_encode()
}
