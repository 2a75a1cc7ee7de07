// src/sharing/gf256.rs
//! Arithmetic in GF(2^8) with the AES reduction polynomial x^8 + x^4 + x^3 + x + 1.
//!
//! Multiplication and division go through log/antilog tables built at compile
//! time with generator 3. Addition and subtraction are both XOR.

const fn xtime(x: u8) -> u8 {
    let shifted = x << 1;
    if x & 0x80 != 0 {
        shifted ^ 0x1B
    } else {
        shifted
    }
}

const fn build_tables() -> ([u8; 256], [u8; 256]) {
    let mut exp = [0u8; 256];
    let mut log = [0u8; 256];
    let mut x: u8 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x;
        log[x as usize] = i as u8;
        // x * 3 == x * 2 + x
        x = xtime(x) ^ x;
        i += 1;
    }
    exp[255] = exp[0];
    (exp, log)
}

const TABLES: ([u8; 256], [u8; 256]) = build_tables();
const EXP: [u8; 256] = TABLES.0;
const LOG: [u8; 256] = TABLES.1;

#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

#[inline]
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let idx = (LOG[a as usize] as usize + LOG[b as usize] as usize) % 255;
    EXP[idx]
}

/// `a / b`. Returns `None` for division by zero.
#[inline]
pub fn div(a: u8, b: u8) -> Option<u8> {
    if b == 0 {
        return None;
    }
    if a == 0 {
        return Some(0);
    }
    let idx = (LOG[a as usize] as usize + 255 - LOG[b as usize] as usize) % 255;
    Some(EXP[idx])
}

/// Evaluates the polynomial with coefficients `coeffs` (constant term first) at `x`.
pub fn eval_poly(coeffs: &[u8], x: u8) -> u8 {
    coeffs
        .iter()
        .rev()
        .fold(0u8, |acc, &c| add(mul(acc, x), c))
}
