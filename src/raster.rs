//! RGBA8 pixel buffers
//!
//! The engine never draws; rasters are what content producers hand to the
//! host and what the memory bank archives. Cropping and resizing are kept
//! deliberately plain (nearest neighbour) since they only feed recall.

use serde::{Deserialize, Serialize};

/// Bytes per pixel
pub const CHANNELS: usize = 4;

/// Owned RGBA8 image, row-major, top-left origin
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Raster {
    /// Transparent black raster
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * CHANNELS],
        }
    }

    /// Raster filled with a single colour
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut raster = Self::new(width, height);
        for px in raster.pixels.chunks_exact_mut(CHANNELS) {
            px.copy_from_slice(&rgba);
        }
        raster
    }

    /// Wrap existing pixel data; returns None if the length does not match
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize * CHANNELS {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    /// Pixel at (x, y), or None outside the raster
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let o = self.offset(x, y);
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[o..o + CHANNELS]);
        Some(px)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let o = self.offset(x, y);
        self.pixels[o..o + CHANNELS].copy_from_slice(&rgba);
    }

    /// Largest valid crop origin for a crop of the given size
    ///
    /// A crop bigger than the source is anchored at the origin.
    pub fn max_crop_origin(&self, crop_width: u32, crop_height: u32) -> (u32, u32) {
        (
            self.width.saturating_sub(crop_width),
            self.height.saturating_sub(crop_height),
        )
    }

    /// Copy a `width` x `height` region starting at (x, y)
    ///
    /// The origin is clamped so the region stays inside the source where
    /// possible. Parts of the region that fall outside a smaller source
    /// stay transparent.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Raster {
        let (max_x, max_y) = self.max_crop_origin(width, height);
        let x0 = x.min(max_x);
        let y0 = y.min(max_y);

        let mut out = Raster::new(width, height);
        let copy_w = width.min(self.width.saturating_sub(x0)) as usize;
        let copy_h = height.min(self.height.saturating_sub(y0));
        for row in 0..copy_h {
            let src = self.offset(x0, y0 + row);
            let dst = out.offset(0, row);
            out.pixels[dst..dst + copy_w * CHANNELS]
                .copy_from_slice(&self.pixels[src..src + copy_w * CHANNELS]);
        }
        out
    }

    /// Nearest-neighbour resize
    pub fn resized(&self, width: u32, height: u32) -> Raster {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut out = Raster::new(width, height);
        if self.is_empty() {
            return out;
        }
        for y in 0..height {
            let sy = (y as u64 * self.height as u64 / height.max(1) as u64) as u32;
            for x in 0..width {
                let sx = (x as u64 * self.width as u64 / width.max(1) as u64) as u32;
                let s = self.offset(sx, sy);
                let d = out.offset(x, y);
                out.pixels[d..d + CHANNELS].copy_from_slice(&self.pixels[s..s + CHANNELS]);
            }
        }
        out
    }

    /// Force every alpha byte to opaque
    pub fn make_opaque(&mut self) {
        for px in self.pixels.chunks_exact_mut(CHANNELS) {
            px[3] = 255;
        }
    }
}
