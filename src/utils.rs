/// Interpolation, unit conversion and formatting helpers
use time::{format_description, OffsetDateTime};

/// Offset between tenths of a degree Celsius and tenths of a Kelvin
pub const DECI_KELVIN_OFFSET: i32 = 2730;

/// Convert tenths of a degree Celsius to tenths of a Kelvin
pub const fn c2k(deci_celsius: i32) -> i32 {
    deci_celsius + DECI_KELVIN_OFFSET
}

/// Convert tenths of a Kelvin to tenths of a degree Celsius
pub const fn k2c(deci_kelvin: i32) -> i32 {
    deci_kelvin - DECI_KELVIN_OFFSET
}

/// Piecewise-linear lookup over an ascending table
///
/// Values below `xs[0]` clamp to `ys[0]`, values at or above the last x clamp
/// to the last y. Otherwise the first `i` with `v < xs[i]` is found and the
/// result is interpolated between points `i - 1` and `i` with truncating
/// integer division, so results match the fixed-point firmware tables exactly.
///
/// # Arguments
/// * `xs` - strictly ascending x values
/// * `ys` - y values parallel to `xs`
/// * `v` - query value
///
/// # Returns
/// The interpolated y, or 0 for an empty table
pub fn interpolate(xs: &[i32], ys: &[i32], v: i32) -> i32 {
    let len = xs.len().min(ys.len());
    if len == 0 {
        return 0;
    }

    if v < xs[0] {
        return ys[0];
    }
    if v >= xs[len - 1] {
        return ys[len - 1];
    }

    let i = (1..len).find(|&i| v < xs[i]).unwrap_or(len - 1);
    ys[i - 1] + (v - xs[i - 1]) * (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1])
}

/// Piecewise-linear lookup over a descending table
///
/// Mirror of [`interpolate`] for tables whose x values fall (thermistor
/// curves): `v >= xs[0]` clamps to `ys[0]` and `v <= xs[last]` clamps to the
/// last y.
pub fn interpolate_descending(xs: &[i32], ys: &[i32], v: i32) -> i32 {
    let len = xs.len().min(ys.len());
    if len == 0 {
        return 0;
    }

    if v >= xs[0] {
        return ys[0];
    }
    if v <= xs[len - 1] {
        return ys[len - 1];
    }

    let i = (1..len).find(|&i| v > xs[i]).unwrap_or(len - 1);
    ys[i - 1] + (v - xs[i - 1]) * (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1])
}

/// True when every x is strictly greater than the one before it
pub fn is_strictly_ascending(xs: &[i32]) -> bool {
    xs.windows(2).all(|w| w[0] < w[1])
}

/// True when every x is strictly smaller than the one before it
pub fn is_strictly_descending(xs: &[i32]) -> bool {
    xs.windows(2).all(|w| w[0] > w[1])
}

/// Render a tenths value such as a temperature as `-1.5`
pub fn format_tenths(value: i32) -> String {
    let sign = if value < 0 { "-" } else { "" };
    format!("{}{}.{}", sign, value.abs() / 10, value.abs() % 10)
}

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}
