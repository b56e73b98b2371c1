//! Live preview of completed frames.

use std::ops::ControlFlow;

use minifb::{Key, Window, WindowOptions};

use crate::output::OutputError;

/// Window showing the most recent frame at its full raster size.
pub struct Preview {
    window: Window,
    buffer: Vec<u32>,
}

impl std::fmt::Debug for Preview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preview")
            .field("pixels", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl Preview {
    /// Opens a `width` x `height` window.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Window`] when no window can be created.
    pub fn open(width: u32, height: u32) -> Result<Self, OutputError> {
        let (width, height) = (width as usize, height as usize);
        let window = Window::new("VERA simulation", width, height, WindowOptions::default())?;
        Ok(Self {
            window,
            buffer: vec![0; width * height],
        })
    }

    /// Shows one packed RGB frame. Breaks when the window was closed or
    /// Escape is held.
    pub fn present(&mut self, rgb: &[u8], width: u32, height: u32) -> ControlFlow<()> {
        if !self.window.is_open() || self.window.is_key_down(Key::Escape) {
            return ControlFlow::Break(());
        }
        for (dst, px) in self.buffer.iter_mut().zip(rgb.chunks_exact(3)) {
            *dst = (u32::from(px[0]) << 16) | (u32::from(px[1]) << 8) | u32::from(px[2]);
        }
        if let Err(err) =
            self.window
                .update_with_buffer(&self.buffer, width as usize, height as usize)
        {
            log::warn!("preview window: {err}");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}
