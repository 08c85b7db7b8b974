//! Surface classification from a rasterized track image
//!
//! The simulation does not understand track geometry; it samples a low-res
//! RGBA copy of the rendered track and calls a pixel "road" when it looks
//! like asphalt. The only consumer is the drag term of the physics stepper.

/// Channel spread at or below which a pixel counts as gray
const SATURATION_TOLERANCE: u8 = 24;
/// Brightness band separating asphalt from black borders and bright grass
const MIN_ROAD_BRIGHTNESS: u8 = 60;
const MAX_ROAD_BRIGHTNESS: u8 = 200;

/// A low-resolution RGBA raster of the track, plus the scale from world
/// coordinates to raster pixels.
#[derive(Debug, Clone)]
pub struct TrackRaster {
    width: u32,
    height: u32,
    /// RGBA, row-major, `width * height * 4` bytes
    data: Vec<u8>,
    /// World units per raster pixel
    world_scale: f32,
}

impl TrackRaster {
    /// Wrap raw RGBA bytes. Returns `None` when the byte count does not match
    /// the dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, world_scale: f32) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 4 || world_scale <= 0.0 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
            world_scale,
        })
    }

    /// Classify a world coordinate. Anything outside the raster is off-road.
    pub fn is_off_road(&self, world_x: f32, world_y: f32) -> bool {
        if !world_x.is_finite() || !world_y.is_finite() {
            return true;
        }
        let px = (world_x / self.world_scale).floor();
        let py = (world_y / self.world_scale).floor();
        if px < 0.0 || py < 0.0 || px >= self.width as f32 || py >= self.height as f32 {
            return true;
        }

        let idx = (py as usize * self.width as usize + px as usize) * 4;
        let r = self.data[idx];
        let g = self.data[idx + 1];
        let b = self.data[idx + 2];
        !is_road_color(r, g, b)
    }
}

/// Asphalt is low-saturation (channels close together) and mid-brightness;
/// black borders and green grass both fail one of the two tests.
fn is_road_color(r: u8, g: u8, b: u8) -> bool {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let spread = max - min;
    let brightness = ((r as u16 + g as u16 + b as u16) / 3) as u8;

    spread <= SATURATION_TOLERANCE
        && (MIN_ROAD_BRIGHTNESS..=MAX_ROAD_BRIGHTNESS).contains(&brightness)
}
