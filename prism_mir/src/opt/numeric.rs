//! Script-level numeric semantics used by constant folding.
//!
//! These helpers compute exactly what the generated code computes at run
//! time, down to NaN propagation, signed zeros and rounding tie-breaks. A
//! fold is only correct if it agrees bit-for-bit with the unfolded code.

/// `ToInt32`: wrap a double modulo 2^32. Non-finite values map to 0.
pub fn to_int32(d: f64) -> i32 {
    if !d.is_finite() {
        return 0;
    }
    if d >= i32::MIN as f64 && d <= i32::MAX as f64 {
        return d as i32;
    }
    let t = d.trunc();
    let m = t.rem_euclid(4_294_967_296.0);
    (m as u64 as u32) as i32
}

/// `ToUint32`.
#[inline]
pub fn to_uint32(d: f64) -> u32 {
    to_int32(d) as u32
}

/// The int32 with exactly the value `d`; `-0` is not an int32.
pub fn number_is_int32(d: f64) -> Option<i32> {
    if d == 0.0 && d.is_sign_negative() {
        return None;
    }
    let i = d as i32;
    if i as f64 == d {
        Some(i)
    } else {
        None
    }
}

/// Whether `d` survives a round trip through `f32`. NaN counts as
/// representable: every float32 NaN widens to a double NaN.
pub fn is_float32_representable(d: f64) -> bool {
    if d.is_nan() {
        return true;
    }
    (d as f32) as f64 == d
}

/// Remainder with the sign of the dividend.
#[inline]
pub fn number_mod(lhs: f64, rhs: f64) -> f64 {
    lhs % rhs
}

/// `Math.pow` / `**`.
pub fn js_pow(base: f64, power: f64) -> f64 {
    if power.is_nan() {
        return f64::NAN;
    }
    if power == 0.0 {
        return 1.0;
    }
    if power.is_infinite() && base.abs() == 1.0 {
        return f64::NAN;
    }
    if let Some(p) = number_is_int32(power) {
        return powi(base, p);
    }
    base.powf(power)
}

/// Exponentiation by squaring, matching the int-power fast path.
fn powi(base: f64, power: i32) -> f64 {
    let mut n = power.unsigned_abs();
    let mut m = base;
    let mut p = 1.0;
    loop {
        if n & 1 != 0 {
            p *= m;
        }
        n >>= 1;
        if n == 0 {
            break;
        }
        m *= m;
    }
    if power < 0 {
        // 1/p may lose the result when p overflowed; recompute directly.
        if p.is_infinite() || p == 0.0 {
            return base.powf(power as f64);
        }
        1.0 / p
    } else {
        p
    }
}

/// `Math.min`: NaN wins, and `-0` is smaller than `+0`.
pub fn js_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == 0.0 && b == 0.0 {
        return if a.is_sign_negative() { a } else { b };
    }
    if a < b {
        a
    } else {
        b
    }
}

/// `Math.max`: NaN wins, and `+0` is larger than `-0`.
pub fn js_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == 0.0 && b == 0.0 {
        return if a.is_sign_negative() { b } else { a };
    }
    if a > b {
        a
    } else {
        b
    }
}

/// `Math.round`: ties go toward +infinity, and values in `[-0.5, 0)`
/// round to `-0`.
pub fn js_round(x: f64) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    if (-0.5..0.0).contains(&x) {
        return -0.0;
    }
    let floor = x.floor();
    if x - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

/// `Math.sign`.
pub fn js_sign(x: f64) -> f64 {
    if x.is_nan() || x == 0.0 {
        x
    } else if x > 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Clamp to `[0, 255]`, rounding half to even.
pub fn clamp_to_uint8(d: f64) -> i32 {
    if d.is_nan() || d <= 0.0 {
        return 0;
    }
    if d >= 255.0 {
        return 255;
    }
    let floor = d.floor();
    let diff = d - floor;
    let rounded = if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if floor % 2.0 == 0.0 {
        floor
    } else {
        floor + 1.0
    };
    rounded as i32
}

/// Count leading zeros of an int32 as unsigned.
#[inline]
pub fn clz32(v: i32) -> i32 {
    (v as u32).leading_zeros() as i32
}

/// `Number.prototype.toString()` in radix 10.
pub fn number_to_string(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d == 0.0 {
        return "0".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if let Some(i) = number_is_int32(d) {
        return i.to_string();
    }

    // Shortest round-tripping digits, as "d.ddde±x".
    let sci = format!("{:e}", d.abs());
    let (mantissa, exponent) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return d.to_string(),
    };
    let exp: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let n = exp + 1;

    let mut out = String::new();
    if d < 0.0 {
        out.push('-');
    }
    if k <= n && n <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        out.push_str(&digits[..n as usize]);
        out.push('.');
        out.push_str(&digits[n as usize..]);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-n) as usize));
        out.push_str(&digits);
    } else {
        out.push_str(&digits[..1]);
        if k > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push(if n - 1 >= 0 { '+' } else { '-' });
        out.push_str(&(n - 1).abs().to_string());
    }
    out
}

/// Whether `d` is a positive power of two with an exact reciprocal.
pub fn is_power_of_two_double(d: f64) -> bool {
    if !d.is_finite() || d == 0.0 {
        return false;
    }
    let bits = d.abs().to_bits();
    let mantissa = bits & ((1u64 << 52) - 1);
    let exponent = (bits >> 52) & 0x7ff;
    // Normal numbers only: the reciprocal of a subnormal overflows.
    mantissa == 0 && exponent != 0 && (1.0 / d).is_finite()
}
