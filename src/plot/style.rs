//! Colours shared by the figures

use plotly::color::Rgb;

/// Categorical palette for conditions
pub const PALETTE: [usize; 8] = [
    0x1b9e77, 0xd95f02, 0x7570b3, 0xe7298a, 0x66a61e, 0xe6ab02, 0xa6761d, 0x666666,
];

pub const UP_COLOUR: usize = 0xd7301f;
pub const DOWN_COLOUR: usize = 0x2b8cbe;
pub const NEUTRAL_COLOUR: usize = 0x9e9e9e;
pub const GUIDE_COLOUR: usize = 0x555555;

pub fn hex_num_to_rgb(num: usize) -> Rgb {
    let r = ((num >> 16) & 0xff) as u8;
    let g = ((num >> 8) & 0xff) as u8;
    let b = (num & 0xff) as u8;
    Rgb::new(r, g, b)
}

/// Distinct condition levels in order of first appearance
pub fn levels_in_order(conditions: &[String]) -> Vec<&str> {
    let mut levels: Vec<&str> = Vec::new();
    for c in conditions {
        if !levels.contains(&c.as_str()) {
            levels.push(c);
        }
    }
    levels
}

/// Palette colour of the `k`-th condition level
pub fn level_colour(k: usize) -> Rgb {
    hex_num_to_rgb(PALETTE[k % PALETTE.len()])
}

/// Red (t = 0) to blue (t = 1) ramp
pub fn sequential_colour(t: f64) -> Rgb {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 1.0 };
    let mix = |a: f64, b: f64| (a + t * (b - a)).round() as u8;
    Rgb::new(mix(215.0, 43.0), mix(48.0, 140.0), mix(31.0, 190.0))
}

/// Category labels made unique by appending the row id to repeated ones
pub fn unique_labels(labels: &[String], ids: &[String]) -> Vec<String> {
    labels
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let repeated = labels.iter().filter(|other| *other == l).count() > 1;
            match ids.get(i) {
                Some(id) if repeated && id != l => format!("{} ({})", l, id),
                _ => l.clone(),
            }
        })
        .collect()
}
