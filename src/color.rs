use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};

const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

const BRIGHTER: f32 = 1.0 / 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scales every channel by `(1/0.7)^k`, clamped to the valid range.
    pub fn brighter(self, k: f32) -> Self {
        let factor = BRIGHTER.powf(k);
        let scale = |c: u8| (c as f32 * factor).round().clamp(0.0, 255.0) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }

    pub fn mix(self, other: Rgb, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let blend = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Self {
            r: blend(self.r, other.r),
            g: blend(self.g, other.g),
            b: blend(self.b, other.b),
        }
    }

    /// Rotates the hue by swapping channel order; used to tell apart links
    /// that would otherwise share a colour.
    pub fn rotate(self) -> Self {
        Self {
            r: self.b,
            g: self.r,
            b: self.g,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let hex = raw
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| anyhow!("colour '{raw}' must start with '#'"))?;
        if hex.len() != 6 {
            bail!("colour '{raw}' must have six hex digits");
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|err| anyhow!("colour '{raw}': {err}"))
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

/// FNV-1a, so the same name maps to the same colour in every session.
fn name_hash(name: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

pub fn name_color(name: &str) -> Rgb {
    let idx = (name_hash(name) % PALETTE.len() as u64) as usize;
    PALETTE[idx].parse().unwrap_or(Rgb::BLACK)
}

pub fn light_color(name: &str) -> Rgb {
    name_color(name).brighter(0.6)
}
