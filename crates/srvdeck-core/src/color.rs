use std::fmt;

pub const SATURATION: f32 = 1.0;
pub const LIGHTNESS: f32 = 0.6;
/// Low alpha so stacked highlights blend instead of hiding each other.
pub const ALPHA: f32 = 0.3;

/// Used when a participant's hue cannot be resolved.
pub const NEUTRAL: Hsla = Hsla {
    hue_deg: 0.0,
    saturation: 0.0,
    lightness: LIGHTNESS,
    alpha: ALPHA,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsla {
    pub hue_deg: f32,
    pub saturation: f32,
    pub lightness: f32,
    pub alpha: f32,
}

/// Identity color for a participant hue.
pub fn color_of(hue: u8) -> Hsla {
    Hsla {
        hue_deg: f32::from(hue) / 255.0 * 360.0,
        saturation: SATURATION,
        lightness: LIGHTNESS,
        alpha: ALPHA,
    }
}

impl Hsla {
    pub fn to_rgb(&self) -> (u8, u8, u8) {
        let chroma = (1.0 - (2.0 * self.lightness - 1.0).abs()) * self.saturation;
        let sector = (self.hue_deg.rem_euclid(360.0)) / 60.0;
        let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
        let (r, g, b) = match sector as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = self.lightness - chroma / 2.0;
        (channel(r + m), channel(g + m), channel(b + m))
    }

    /// Composites the color over an opaque background.
    pub fn blend_over(&self, background: (u8, u8, u8)) -> (u8, u8, u8) {
        let (r, g, b) = self.to_rgb();
        let mix = |fg: u8, bg: u8| -> u8 {
            let value = f32::from(fg) * self.alpha + f32::from(bg) * (1.0 - self.alpha);
            value.round().clamp(0.0, 255.0) as u8
        };
        (
            mix(r, background.0),
            mix(g, background.1),
            mix(b, background.2),
        )
    }
}

fn channel(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

impl fmt::Display for Hsla {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsla({}, {}%, {}%, {})",
            self.hue_deg,
            (self.saturation * 100.0).round(),
            (self.lightness * 100.0).round(),
            self.alpha
        )
    }
}
