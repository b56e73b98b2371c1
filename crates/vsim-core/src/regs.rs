//! External register map of the display controller.
//!
//! The chip decodes 32 byte-wide registers at `VERA_BASE..VERA_BASE + 0x20`
//! on the host CPU bus.

/// Host address of register 0.
pub const VERA_BASE: u16 = 0x9F20;
/// Mask selecting the register window out of a host address.
pub const VERA_WINDOW_MASK: u16 = 0xFFE0;
/// Number of external registers.
pub const REGISTER_COUNT: usize = 32;
/// Mask applied to register indices.
pub const REGISTER_MASK: u8 = 0x1F;

/// VRAM address bits 7:0.
pub const ADDR_L: u8 = 0x00;
/// VRAM address bits 15:8.
pub const ADDR_M: u8 = 0x01;
/// VRAM address bit 16 and the auto-increment field.
pub const ADDR_H: u8 = 0x02;
/// VRAM data port 0.
pub const DATA0: u8 = 0x03;
/// VRAM data port 1.
pub const DATA1: u8 = 0x04;
/// Control register.
pub const CTRL: u8 = 0x05;
/// Interrupt enable.
pub const IEN: u8 = 0x06;
/// Interrupt status.
pub const ISR: u8 = 0x07;
/// Interrupt line compare.
pub const IRQ_LINE_L: u8 = 0x08;
/// Display composer video control.
pub const DC_VIDEO: u8 = 0x09;
/// Display composer horizontal scale.
pub const DC_HSCALE: u8 = 0x0A;
/// Display composer vertical scale.
pub const DC_VSCALE: u8 = 0x0B;
/// Display composer border color.
pub const DC_BORDER: u8 = 0x0C;
/// Layer 0 configuration.
pub const L0_CONFIG: u8 = 0x0D;
/// Layer 1 configuration.
pub const L1_CONFIG: u8 = 0x14;
/// Audio control; writing it ends fast-mode replay pacing.
pub const AUDIO_CTRL: u8 = 0x1B;
/// Audio sample rate.
pub const AUDIO_RATE: u8 = 0x1C;
/// Audio FIFO data.
pub const AUDIO_DATA: u8 = 0x1D;
/// SPI data.
pub const SPI_DATA: u8 = 0x1E;
/// SPI control.
pub const SPI_CTRL: u8 = 0x1F;

/// Maps a host address inside the register window to its register index.
#[must_use]
pub const fn register_for_address(addr: u16) -> Option<u8> {
    if addr & VERA_WINDOW_MASK == VERA_BASE {
        #[allow(clippy::cast_possible_truncation)]
        Some((addr & REGISTER_MASK as u16) as u8)
    } else {
        None
    }
}
