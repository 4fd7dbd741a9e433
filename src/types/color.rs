//! Hex colour parsing.

/// Parse `#rrggbb`, `rrggbb` or `#rgb` into sRGB components in `[0, 1]`.
pub fn parse_hex_color(hex: &str) -> Option<[f32; 3]> {
    let digits = hex.trim().trim_start_matches('#');
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return None,
    };

    let mut rgb = [0.0f32; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        let byte = u8::from_str_radix(expanded.get(i * 2..i * 2 + 2)?, 16).ok()?;
        *channel = byte as f32 / 255.0;
    }
    Some(rgb)
}

/// sRGB transfer function to linear.
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Parse a hex colour straight into linear RGB, as glTF factors expect.
pub fn hex_to_linear(hex: &str) -> Option<[f32; 3]> {
    parse_hex_color(hex).map(|rgb| rgb.map(srgb_to_linear))
}
