//! Bucket colors.

use rand::Rng;
use rand::seq::IndexedRandom;

pub const PALETTE: [&str; 7] = [
    "#0065bd", "#16db93", "#eca400", "#f5f749", "#a4036f", "#c5c3c6", "#8a716a",
];

const PALETTE_RGB: [[u8; 3]; 7] = [
    [0, 101, 189],
    [22, 219, 147],
    [236, 164, 0],
    [245, 247, 73],
    [164, 3, 111],
    [197, 195, 198],
    [138, 113, 106],
];

pub const DISCARD_COLOR: &str = "#f24236";
pub const DISCARD_LISTING_COLOR: &str = "#181818";

const ALPHA_FLOOR: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variation {
    Shade,
    Tint,
}

/// Hands out palette colors so that no two live buckets share one.
#[derive(Debug, Clone, Default)]
pub struct BucketPalette {
    taken: [bool; PALETTE.len()],
}

impl BucketPalette {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first free palette color, or a shade/tint of a random
    /// palette color once all are in use.
    pub fn assign<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        if let Some(slot) = self.taken.iter().position(|taken| !taken) {
            self.taken[slot] = true;
            return PALETTE[slot].to_string();
        }

        let base = PALETTE_RGB.choose(rng).copied().unwrap_or(PALETTE_RGB[0]);
        let variation = if rng.random_bool(0.5) {
            Variation::Shade
        } else {
            Variation::Tint
        };
        let coef = rng.random_range(0.3..0.9);
        derived_color(base, variation, coef)
    }

    /// Frees the slot of a palette color. Other colors are ignored.
    pub fn relinquish(&mut self, color: &str) {
        if let Some(slot) = PALETTE.iter().position(|c| *c == color) {
            self.taken[slot] = false;
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn derived_color(base: [u8; 3], variation: Variation, coef: f64) -> String {
    let channels = base.map(|c| {
        let c = f64::from(c);
        let value = match variation {
            Variation::Shade => c * coef,
            Variation::Tint => (255.0 - c).mul_add(coef, c),
        };
        value.clamp(0.0, 255.0) as u8
    });
    format!("#{:02x}{:02x}{:02x}", channels[0], channels[1], channels[2])
}

/// Appends a confidence-derived alpha byte to a `#rrggbb` color.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn confidence_color(bucket_color: &str, confidence: f64) -> String {
    let alpha = confidence
        .clamp(0.0, 1.0)
        .mul_add(255.0 - ALPHA_FLOOR, ALPHA_FLOOR) as u8;
    format!("{bucket_color}{alpha:02x}")
}
