use image::RgbaImage;
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};

use crate::error::{Error, Result};

/// Mouse state sampled once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerState {
    pub pos: Option<(f32, f32)>,
    pub left: bool,
    pub right: bool,
    pub wheel: f32,
}

pub struct WindowOutput {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl WindowOutput {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = Window::new(title, width, height, WindowOptions::default())
            .map_err(|e| Error::Window(format!("failed to create window: {e}")))?;

        window.set_target_fps(60);

        Ok(Self { window, buffer: vec![0; width * height], width, height })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    /// Keys pressed since the last frame, without auto-repeat.
    pub fn pressed_keys(&self) -> Vec<Key> {
        self.window.get_keys_pressed(KeyRepeat::No)
    }

    pub fn is_key_down(&self, key: Key) -> bool {
        self.window.is_key_down(key)
    }

    pub fn pointer(&self) -> PointerState {
        PointerState {
            pos: self.window.get_mouse_pos(MouseMode::Discard),
            left: self.window.get_mouse_down(MouseButton::Left),
            right: self.window.get_mouse_down(MouseButton::Right),
            wheel: self.window.get_scroll_wheel().map(|(_, y)| y).unwrap_or(0.0),
        }
    }

    /// Presents an RGBA surface; the window buffer follows the surface size.
    pub fn present(&mut self, surface: &RgbaImage) -> Result<()> {
        let (w, h) = (surface.width() as usize, surface.height() as usize);
        if w != self.width || h != self.height {
            self.width = w;
            self.height = h;
        }
        self.buffer.resize(self.width * self.height, 0);
        for (dst, px) in self.buffer.iter_mut().zip(surface.pixels()) {
            *dst = ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32;
        }
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| Error::Window(format!("window update failed: {e}")))
    }

    /// Keeps the window responsive when there is no frame to show.
    pub fn pump(&mut self) {
        self.window.update();
    }
}
