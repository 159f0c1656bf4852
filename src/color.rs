//! Color scales, interpolation and text contrast for heatmap annotations.
//!
//! Named scales are approximations: `Viridis` is a fixed five-stop gradient
//! and any other name falls back to a two-stop blue-to-red gradient. Supply
//! explicit stops when exact colors matter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const GRAY: Rgb = Rgb { r: 128, g: 128, b: 128 };
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_css(&self) -> String {
        format!("rgb({},{},{})", self.r, self.g, self.b)
    }

    pub fn luminance(&self) -> f64 {
        relative_luminance(*self)
    }
}

/// Parse `#rgb`, `#rrggbb`, `rgb(r,g,b)` or `rgba(r,g,b,a)`. Anything else is
/// mid-gray.
pub fn parse_color(input: &str) -> Rgb {
    let input = input.trim();
    if let Some(hex) = input.strip_prefix('#') {
        return parse_hex(hex).unwrap_or(Rgb::GRAY);
    }
    if input.starts_with("rgb") {
        return parse_rgb_fn(input).unwrap_or(Rgb::GRAY);
    }
    Rgb::GRAY
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|d| d * 17);
            Some(Rgb::new(digit(0)?, digit(1)?, digit(2)?))
        }
        6 => {
            let v = u32::from_str_radix(hex, 16).ok()?;
            Some(Rgb::new((v >> 16) as u8, (v >> 8) as u8, v as u8))
        }
        _ => None,
    }
}

fn parse_rgb_fn(input: &str) -> Option<Rgb> {
    let open = input.find('(')?;
    let prefix = &input[..open];
    if prefix != "rgb" && prefix != "rgba" {
        return None;
    }
    let close = input[open..].find(')')? + open;
    let channels: Vec<u8> = input[open + 1..close]
        .split(',')
        .take(3)
        .map(|part| part.trim().parse::<u32>().ok().map(|v| v.min(255) as u8))
        .collect::<Option<Vec<_>>>()?;
    if channels.len() < 3 {
        return None;
    }
    Some(Rgb::new(channels[0], channels[1], channels[2]))
}

fn linearize(channel: u8) -> f64 {
    let c = channel as f64 / 255.0;
    if c <= 0.03928 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB relative luminance in `[0, 1]`.
pub fn relative_luminance(rgb: Rgb) -> f64 {
    0.2126 * linearize(rgb.r) + 0.7152 * linearize(rgb.g) + 0.0722 * linearize(rgb.b)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub position: f64,
    pub color: String,
}

impl ColorStop {
    pub fn new(position: f64, color: &str) -> Self {
        Self {
            position,
            color: color.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScale {
    Named(String),
    Stops(Vec<ColorStop>),
}

impl ColorScale {
    pub fn viridis() -> Self {
        ColorScale::Named("Viridis".to_string())
    }

    /// Red at 0, gray at 0.5, green at 1.
    pub fn win_rate() -> Self {
        ColorScale::Stops(vec![
            ColorStop::new(0.0, "rgb(255, 0, 0)"),
            ColorStop::new(0.5, "rgb(128, 128, 128)"),
            ColorStop::new(1.0, "rgb(0, 255, 0)"),
        ])
    }

    /// Stops sorted by position (stable for equal positions).
    pub fn from_stops(mut stops: Vec<ColorStop>) -> Self {
        stops.sort_by(|a, b| a.position.total_cmp(&b.position));
        ColorScale::Stops(stops)
    }

    /// The concrete stops used for interpolation.
    pub fn stops(&self) -> Vec<ColorStop> {
        match self {
            ColorScale::Named(name) if name.eq_ignore_ascii_case("viridis") => vec![
                ColorStop::new(0.0, "rgb(68,1,84)"),
                ColorStop::new(0.25, "rgb(59,82,139)"),
                ColorStop::new(0.5, "rgb(33,145,140)"),
                ColorStop::new(0.75, "rgb(94,201,98)"),
                ColorStop::new(1.0, "rgb(253,231,37)"),
            ],
            ColorScale::Named(_) => vec![
                ColorStop::new(0.0, "rgb(0,0,255)"),
                ColorStop::new(1.0, "rgb(255,0,0)"),
            ],
            ColorScale::Stops(stops) => stops.clone(),
        }
    }
}

fn lerp_channel(lo: u8, hi: u8, t: f64) -> u8 {
    (lo as f64 + (hi as f64 - lo as f64) * t).round().clamp(0.0, 255.0) as u8
}

/// Interpolated background color for `value` on `[zmin, zmax]`.
///
/// `None` for a missing or NaN value. A degenerate range yields the first stop.
pub fn color_for_value(value: Option<f64>, zmin: f64, zmax: f64, scale: &ColorScale) -> Option<Rgb> {
    let value = value.filter(|v| !v.is_nan())?;
    let stops = scale.stops();
    let first = stops.first().map(|s| parse_color(&s.color)).unwrap_or(Rgb::GRAY);
    let range = zmax - zmin;
    if range.is_nan() || range <= 0.0 || stops.len() < 2 {
        return Some(first);
    }

    let t = ((value - zmin) / range).clamp(0.0, 1.0);
    let mut lower = &stops[0];
    let mut upper = &stops[stops.len() - 1];
    for pair in stops.windows(2) {
        if t >= pair[0].position && t <= pair[1].position {
            lower = &pair[0];
            upper = &pair[1];
            break;
        }
    }

    let span = upper.position - lower.position;
    let frac = if span == 0.0 { 0.0 } else { (t - lower.position) / span };
    let lo = parse_color(&lower.color);
    let hi = parse_color(&upper.color);
    Some(Rgb::new(
        lerp_channel(lo.r, hi.r, frac),
        lerp_channel(lo.g, hi.g, frac),
        lerp_channel(lo.b, hi.b, frac),
    ))
}

/// Same as [`color_for_value`] but as a CSS `rgb(r,g,b)` string.
pub fn css_for_value(value: Option<f64>, zmin: f64, zmax: f64, scale: &ColorScale) -> Option<String> {
    color_for_value(value, zmin, zmax, scale).map(|c| c.to_css())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextColor {
    Black,
    White,
}

impl TextColor {
    /// Dark text on backgrounds brighter than `threshold`, light text otherwise.
    pub fn for_background(background: Rgb, threshold: f64) -> Self {
        if background.luminance() > threshold {
            TextColor::Black
        } else {
            TextColor::White
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextColor::Black => "black",
            TextColor::White => "white",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bw() -> ColorScale {
        ColorScale::Stops(vec![
            ColorStop::new(0.0, "rgb(0,0,0)"),
            ColorStop::new(1.0, "rgb(255,255,255)"),
        ])
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!(parse_color("#fff"), Rgb::WHITE);
        assert_eq!(parse_color("#0a0B0c"), Rgb::new(10, 11, 12));
        assert_eq!(parse_color("rgb(1, 2, 3)"), Rgb::new(1, 2, 3));
        assert_eq!(parse_color("rgba(4,5,6,0.5)"), Rgb::new(4, 5, 6));
        assert_eq!(parse_color("rgb( 7 ,8,9 )"), Rgb::new(7, 8, 9));
    }

    #[test]
    fn test_parse_garbage_is_gray() {
        for s in ["", "red", "#12", "#zzzzzz", "rgb(1,2)", "rgb(a,b,c)", "rgbx(1,2,3)"] {
            assert_eq!(parse_color(s), Rgb::GRAY, "input {:?}", s);
        }
    }

    #[test]
    fn test_luminance_bounds() {
        assert_eq!(relative_luminance(Rgb::WHITE), 1.0);
        assert_eq!(relative_luminance(Rgb::BLACK), 0.0);
        let gray = relative_luminance(Rgb::GRAY);
        assert!(gray > 0.2 && gray < 0.23);
    }

    #[test]
    fn test_midpoint_gray() {
        let c = css_for_value(Some(5.0), 0.0, 10.0, &bw());
        assert_eq!(c.as_deref(), Some("rgb(128,128,128)"));
    }

    #[test]
    fn test_nan_and_missing_have_no_color() {
        assert_eq!(color_for_value(Some(f64::NAN), 0.0, 10.0, &bw()), None);
        assert_eq!(color_for_value(None, 0.0, 10.0, &bw()), None);
    }

    #[test]
    fn test_degenerate_range_uses_first_stop() {
        assert_eq!(color_for_value(Some(3.0), 1.0, 1.0, &bw()), Some(Rgb::BLACK));
        assert_eq!(color_for_value(Some(3.0), 2.0, 1.0, &ColorScale::win_rate()), Some(Rgb::new(255, 0, 0)));
        assert_eq!(color_for_value(Some(3.0), 2.0, 1.0, &ColorScale::viridis()), Some(Rgb::new(68, 1, 84)));
    }

    #[test]
    fn test_clamped_outside_range() {
        assert_eq!(color_for_value(Some(-4.0), 0.0, 1.0, &bw()), Some(Rgb::BLACK));
        assert_eq!(color_for_value(Some(9.0), 0.0, 1.0, &bw()), Some(Rgb::WHITE));
    }

    #[test]
    fn test_three_stop_scale_picks_bracket() {
        let scale = ColorScale::win_rate();
        assert_eq!(color_for_value(Some(0.5), 0.0, 1.0, &scale), Some(Rgb::GRAY));
        // halfway between gray and green
        assert_eq!(color_for_value(Some(0.75), 0.0, 1.0, &scale), Some(Rgb::new(64, 192, 64)));
    }

    #[test]
    fn test_named_fallbacks() {
        assert_eq!(color_for_value(Some(1.0), 0.0, 1.0, &ColorScale::viridis()), Some(Rgb::new(253, 231, 37)));
        let other = ColorScale::Named("Plasma".to_string());
        assert_eq!(color_for_value(Some(0.0), 0.0, 1.0, &other), Some(Rgb::new(0, 0, 255)));
        assert_eq!(color_for_value(Some(1.0), 0.0, 1.0, &other), Some(Rgb::new(255, 0, 0)));
    }

    #[test]
    fn test_text_contrast_threshold() {
        assert_eq!(TextColor::for_background(Rgb::WHITE, 0.35), TextColor::Black);
        assert_eq!(TextColor::for_background(Rgb::BLACK, 0.35), TextColor::White);
        // gray luminance ~0.216 sits between the two historical thresholds
        assert_eq!(TextColor::for_background(Rgb::GRAY, 0.2), TextColor::Black);
        assert_eq!(TextColor::for_background(Rgb::GRAY, 0.35), TextColor::White);
    }

    #[test]
    fn test_from_stops_sorts() {
        let scale = ColorScale::from_stops(vec![
            ColorStop::new(1.0, "#fff"),
            ColorStop::new(0.0, "#000"),
        ]);
        assert_eq!(scale.stops()[0].position, 0.0);
    }
}
