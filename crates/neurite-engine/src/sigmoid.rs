//! Bit-packed piecewise-linear sigmoid approximation
//!
//! The integer kernels can substitute `1/(1+e^(-x))` with a piecewise
//! linear curve evaluated in pure integer arithmetic. The sample ordinate
//! at integer abscissa `p` is built by a bit-packing rule: the i-th bit
//! from the top of the Q-bit ordinate is `(i / p) mod 2`, with `p = 0`
//! mapping to the half-scale point. Arguments between sample points are
//! linearly interpolated by the fractional part, and negative arguments
//! are mirrored through `M - y` (a zero result remaps to `M - 1` so the
//! mirror never saturates to full scale).
//!
//! The construction is a compatibility surface: outputs must match the
//! model tooling bit for bit.

/// 8-bit approximation, `M = 256`
pub(crate) fn fast_sigmoid_q8(arg: i32) -> u8 {
    fast_sigmoid(i64::from(arg), 8) as u8
}

/// 16-bit approximation, `M = 65536`
#[cfg(feature = "q16")]
pub(crate) fn fast_sigmoid_q16(arg: i64) -> u16 {
    fast_sigmoid(arg, 16) as u16
}

fn fast_sigmoid(arg: i64, qlvl: u32) -> i64 {
    let max_value = 1i64 << qlvl;
    let half = max_value >> 1;

    let int_part = arg.abs() / max_value;
    let real_part = arg.abs() - (int_part << qlvl);

    if int_part == 0 && real_part == 0 {
        return half;
    }

    if real_part == 0 {
        // exactly on a sample point; the sign folds into the bit pattern
        let sign = if arg > 0 { 0 } else { 1 };
        return pack_ordinate(int_part, sign, qlvl);
    }

    let second_x = int_part + 1;
    let (first_y, second_y) = if int_part == 0 {
        (half, pack_ordinate(second_x, 0, qlvl))
    } else {
        (
            pack_ordinate(int_part, 0, qlvl),
            pack_ordinate(second_x, 0, qlvl),
        )
    };

    let res = ((max_value - real_part) * first_y + real_part * second_y) >> qlvl;
    if arg > 0 {
        res
    } else if res == 0 {
        max_value - 1
    } else {
        max_value - res
    }
}

/// Ordinate at abscissa `p > 0`: bit i from the top is `(i / p + s) mod 2`
fn pack_ordinate(p: i64, s: i64, qlvl: u32) -> i64 {
    let mut y = 0i64;
    for i in 0..i64::from(qlvl) {
        let bit = (i / p + s) % 2;
        y |= bit << (i64::from(qlvl) - i - 1);
    }
    y
}
