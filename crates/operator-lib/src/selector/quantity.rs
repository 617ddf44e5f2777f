//! Canonical rendering of resource quantities
//!
//! The solver compares quantities in their canonical text form, so `2000m`
//! goes out as `2` and `1024Mi` as `1Gi`. Decimal values are kept at nano
//! precision, rounding away from zero below it.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const DECIMAL_SUFFIXES: [(i32, &str); 10] = [
    (-9, "n"),
    (-6, "u"),
    (-3, "m"),
    (0, ""),
    (3, "k"),
    (6, "M"),
    (9, "G"),
    (12, "T"),
    (15, "P"),
    (18, "E"),
];

const BINARY_SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    DecimalSi,
    BinarySi,
    DecimalExponent,
}

/// `mantissa * 10^exponent`, with the notation it was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Parsed {
    mantissa: i128,
    exponent: i32,
    format: Format,
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

fn parse(raw: &str) -> Option<Parsed> {
    let raw = raw.trim();
    let (negative, body) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };

    let number_len = body
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(body.len());
    let (number, suffix) = body.split_at(number_len);
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.contains('.') {
        return None;
    }

    let digits = format!("{}{}", whole, fraction);
    let mut mantissa: i128 = if digits.is_empty() {
        0
    } else {
        digits.parse().ok()?
    };
    if negative {
        mantissa = -mantissa;
    }
    let mut exponent = -i32::try_from(fraction.len()).ok()?;

    let format = match suffix {
        "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" => {
            let power = BINARY_SUFFIXES.iter().position(|s| *s == suffix)?;
            mantissa = mantissa.checked_mul(1024i128.checked_pow(u32::try_from(power).ok()?)?)?;
            Format::BinarySi
        }
        s if s.len() > 1 && (s.starts_with('e') || s.starts_with('E')) => {
            exponent = exponent.checked_add(s[1..].parse::<i32>().ok()?)?;
            Format::DecimalExponent
        }
        s => {
            let (scale, _) = DECIMAL_SUFFIXES.iter().find(|(_, name)| *name == s)?;
            exponent = exponent.checked_add(*scale)?;
            Format::DecimalSi
        }
    };

    Some(Parsed {
        mantissa,
        exponent,
        format,
    })
}

/// Round up to nano precision, then drop trailing zeros
fn normalize(mut mantissa: i128, mut exponent: i32) -> Option<(i128, i32)> {
    if exponent < -9 {
        let divisor = pow10(u32::try_from(-9 - exponent).ok()?)?;
        let rounded = mantissa / divisor;
        mantissa = if mantissa % divisor == 0 {
            rounded
        } else {
            rounded + mantissa.signum()
        };
        exponent = -9;
    }
    if mantissa == 0 {
        return Some((0, 0));
    }
    while mantissa % 10 == 0 {
        mantissa /= 10;
        exponent += 1;
    }
    Some((mantissa, exponent))
}

fn render_decimal(mantissa: i128, exponent: i32, format: Format) -> Option<String> {
    let (mantissa, exponent) = normalize(mantissa, exponent)?;
    if mantissa == 0 {
        return Some("0".to_string());
    }

    // Largest multiple of three not above the exponent
    let mut group = exponent.div_euclid(3) * 3;
    if format == Format::DecimalSi {
        group = group.min(18);
    }
    let mantissa = mantissa.checked_mul(pow10(u32::try_from(exponent - group).ok()?)?)?;

    let suffix = match format {
        Format::DecimalExponent if group == 0 => String::new(),
        Format::DecimalExponent => format!("e{}", group),
        _ => DECIMAL_SUFFIXES
            .iter()
            .find(|(scale, _)| *scale == group)
            .map(|(_, name)| name.to_string())?,
    };
    Some(format!("{}{}", mantissa, suffix))
}

fn render_binary(mantissa: i128, exponent: i32) -> Option<String> {
    let (mantissa, exponent) = normalize(mantissa, exponent)?;
    if exponent < 0 {
        return render_decimal(mantissa, exponent, Format::DecimalSi);
    }
    let mut value = mantissa.checked_mul(pow10(u32::try_from(exponent).ok()?)?)?;
    if value.abs() < 1024 {
        return render_decimal(value, 0, Format::DecimalSi);
    }

    let mut power = 0;
    while power < BINARY_SUFFIXES.len() - 1 && value % 1024 == 0 {
        value /= 1024;
        power += 1;
    }
    Some(format!("{}{}", value, BINARY_SUFFIXES[power]))
}

/// Canonical text of a quantity; unparseable input is passed through as-is
pub fn canonical(quantity: &Quantity) -> String {
    parse(&quantity.0)
        .and_then(|parsed| match parsed.format {
            Format::BinarySi => render_binary(parsed.mantissa, parsed.exponent),
            format => render_decimal(parsed.mantissa, parsed.exponent, format),
        })
        .unwrap_or_else(|| quantity.0.clone())
}

/// Whether a quantity denotes zero, whatever its suffix
///
/// Empty quantities count as zero; unparseable ones are kept as constraints.
pub fn is_zero(quantity: &Quantity) -> bool {
    if quantity.0.trim().is_empty() {
        return true;
    }
    parse(&quantity.0)
        .map(|parsed| parsed.mantissa == 0)
        .unwrap_or(false)
}
