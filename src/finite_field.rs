use std::ops::{Add, Mul, Sub};

use crate::error::{CustodyError, Result};

/// Generator of the multiplicative group used to build the tables
const GENERATOR: u8 = 0x03;

/// Low byte of the AES reducing polynomial x⁸ + x⁴ + x³ + x + 1 (0x11B)
const REDUCING_POLY_LOW: u8 = 0x1b;

/// Russian peasant multiplication in GF(2^8).
///
/// Only used at compile time to fill the exponential table, and by the tests
/// as a reference for the table-driven multiply.
const fn gf256_multiply_peasant(a: u8, b: u8) -> u8 {
    let mut a = a;
    let mut b = b;
    let mut p: u8 = 0;
    let mut round = 0;
    while round < 8 {
        if (b & 1) != 0 {
            p ^= a;
        }
        let carry = a & 0x80;
        a <<= 1;
        if carry != 0 {
            a ^= REDUCING_POLY_LOW;
        }
        b >>= 1;
        round += 1;
    }
    p
}

struct Tables {
    /// exp[i] = g^i; doubled so that log(a) + log(b) never needs a modulo
    exp: [u8; 512],
    /// log[g^i] = i; log[0] is unused
    log: [u8; 256],
}

const fn build_tables() -> Tables {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];

    let mut x: u8 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x;
        log[x as usize] = i as u8;
        x = gf256_multiply_peasant(x, GENERATOR);
        i += 1;
    }
    while i < 512 {
        exp[i] = exp[i - 255];
        i += 1;
    }

    Tables { exp, log }
}

static TABLES: Tables = build_tables();

/// Galois Field (GF(256)) arithmetic implementation
///
/// Represents elements in GF(2⁸) using irreducible polynomial x⁸ + x⁴ + x³ + x + 1 (0x11B).
/// Multiplication and division go through exponential/logarithm tables that are
/// evaluated at compile time.
///
/// # Example
/// ```
/// use keycustody::FiniteField;
///
/// let a = FiniteField::new(0x53);
/// let b = FiniteField::new(0xCA);
/// let sum = a + b;  // XOR operation
/// let product = a * b;  // Table lookup
/// assert_eq!(product, FiniteField::new(0x01));
/// assert_eq!(sum, FiniteField::new(0x99));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiniteField(pub u8);

impl FiniteField {
    pub const ZERO: FiniteField = FiniteField(0);
    pub const ONE: FiniteField = FiniteField(1);

    /// Creates a new finite field element
    #[inline]
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    /// Multiplies two elements via log/exp table lookup
    ///
    /// # Example
    /// ```
    /// use keycustody::FiniteField;
    ///
    /// let a = FiniteField::new(0x53);
    /// let b = FiniteField::new(0xCA);
    /// assert_eq!(a.multiply(b), FiniteField::new(0x01));
    /// ```
    #[inline]
    pub fn multiply(self, other: Self) -> Self {
        if self.0 == 0 || other.0 == 0 {
            return Self::ZERO;
        }
        let log_sum = TABLES.log[self.0 as usize] as usize + TABLES.log[other.0 as usize] as usize;
        Self(TABLES.exp[log_sum])
    }

    /// Divides `self` by `other`
    ///
    /// # Errors
    /// Returns [`CustodyError::DivisionByZero`] when `other` is zero.
    ///
    /// # Example
    /// ```
    /// use keycustody::FiniteField;
    ///
    /// let a = FiniteField::new(0x57);
    /// let b = FiniteField::new(0x13);
    /// assert_eq!(a.multiply(b).divide(b).unwrap(), a);
    /// assert!(a.divide(FiniteField::new(0)).is_err());
    /// ```
    #[inline]
    pub fn divide(self, other: Self) -> Result<Self> {
        if other.0 == 0 {
            return Err(CustodyError::DivisionByZero);
        }
        if self.0 == 0 {
            return Ok(Self::ZERO);
        }
        let log_diff =
            TABLES.log[self.0 as usize] as usize + 255 - TABLES.log[other.0 as usize] as usize;
        Ok(Self(TABLES.exp[log_diff]))
    }

    /// Computes exponentiation in GF(256) using square-and-multiply
    ///
    /// # Example
    /// ```
    /// use keycustody::FiniteField;
    ///
    /// let base = FiniteField::new(0x03);
    /// assert_eq!(base.exp(3), base * base * base);
    /// ```
    #[inline]
    pub fn exp(self, mut exp: u32) -> Self {
        let mut result = Self::ONE;
        let mut base = self;
        while exp > 0 {
            if exp & 1 == 1 {
                result = result.multiply(base);
            }
            base = base.multiply(base);
            exp >>= 1;
        }
        result
    }

    /// Multiplicative inverse; `None` for zero
    #[inline]
    pub fn inverse(self) -> Option<Self> {
        if self.0 == 0 {
            None
        } else {
            Some(Self(TABLES.exp[255 - TABLES.log[self.0 as usize] as usize]))
        }
    }
}

/// Implements addition as XOR in GF(2⁸)
impl Add for FiniteField {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        #[allow(clippy::suspicious_arithmetic_impl)]
        let result = self.0 ^ other.0;
        Self(result)
    }
}

impl Mul for FiniteField {
    type Output = Self;
    #[inline]
    fn mul(self, other: Self) -> Self {
        self.multiply(other)
    }
}

impl Sub for FiniteField {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        // Subtraction and addition coincide in characteristic 2
        self.add(other)
    }
}
